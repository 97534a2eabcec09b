mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use kb_cluster::{JobSpec, JobScript};
use kb_core::{ConfigMap, Install, ParameterSpec, Provides, Requirement};
use kb_engine::{ConfigManager, DeployManager, EngineError, LogSink, ManifestManager};

const TIMEOUT: Duration = Duration::from_millis(300);

async fn publish_pg_and_app(h: &Harness) {
    h.publish(&application("pg", vec![])).await;
    h.publish(&application("app", vec![requirement("pg", "primary")]))
        .await;
}

#[tokio::test]
async fn install_creates_suffixed_dependency_install() {
    let h = Harness::new().await;
    publish_pg_and_app(&h).await;
    h.store_manifest(vec![manifest_bundle("pg"), manifest_bundle("app")])
        .await;

    let plan = h.manifests().install(NS, "stack", false).await.unwrap();

    assert_eq!(
        plan.layers,
        vec![vec!["pg-primary".to_string()], vec!["app".to_string()]]
    );
    assert_eq!(h.install_names().await, vec!["app", "pg-primary"]);
    let pg = h.client.require::<Install>(NS, "pg-primary").await.unwrap().value;
    assert_eq!(pg.spec.application, "pg");
    assert_eq!(pg.spec.suffix, "primary");
    assert_eq!(pg.spec.flavor, "single-node");
}

#[tokio::test]
async fn reinstall_keeps_user_edits() {
    let h = Harness::new().await;
    let mut pg = application("pg", vec![]);
    pg.parameter_definitions = vec![kb_core::ParameterDefinition {
        name: "size".to_string(),
        default: "1Gi".to_string(),
        ..Default::default()
    }];
    h.publish(&pg).await;
    let mut bundle = manifest_bundle("pg");
    bundle.parameters = vec![ParameterSpec::new("size", "5Gi")];
    h.store_manifest(vec![bundle]).await;
    let manifests = h.manifests();

    manifests.install(NS, "stack", false).await.unwrap();
    let config = ConfigManager::new(h.client.clone(), &h.config);
    assert_eq!(config.get(NS, "pg", "size").await.unwrap(), "5Gi");
    config.set(NS, "pg", "size", "20Gi").await.unwrap();

    manifests.install(NS, "stack", false).await.unwrap();
    assert_eq!(config.get(NS, "pg", "size").await.unwrap(), "20Gi");
}

#[tokio::test]
async fn requirement_parameters_reach_the_dependency_install() {
    let h = Harness::new().await;
    h.publish(&application("pg", vec![])).await;
    h.publish(&application(
        "app",
        vec![Requirement {
            name: "pg".to_string(),
            suffix: "app".to_string(),
            parameters: vec![ParameterSpec::new("database", "app")],
        }],
    ))
    .await;
    let mut app_bundle = manifest_bundle("app");
    app_bundle.requires = vec![Requirement {
        name: "pg".to_string(),
        suffix: "app".to_string(),
        parameters: vec![ParameterSpec::new("user", "app-user")],
    }];
    h.store_manifest(vec![manifest_bundle("pg"), app_bundle]).await;

    h.manifests().install(NS, "stack", false).await.unwrap();

    let pg = h.client.require::<Install>(NS, "pg-app").await.unwrap().value;
    assert_eq!(
        pg.spec.parameters,
        vec![
            ParameterSpec::new("database", "app"),
            ParameterSpec::new("user", "app-user"),
        ]
    );
}

#[tokio::test]
async fn insufficient_cluster_resources_need_force() {
    let h = Harness::new().await;
    publish_pg_and_app(&h).await;
    let mut manifest = h
        .store_manifest(vec![manifest_bundle("pg"), manifest_bundle("app")])
        .await;
    manifest.spec.memory = "64Gi".to_string();
    h.client.apply(NS, &manifest).await.unwrap();
    let manifests = h.manifests();

    let err = manifests.install(NS, "stack", false).await.unwrap_err();
    assert!(matches!(err.root(), EngineError::Admission(_)));
    assert!(h.install_names().await.is_empty());

    manifests.install(NS, "stack", true).await.unwrap();
    assert_eq!(h.install_names().await.len(), 2);
}

#[tokio::test]
async fn force_does_not_skip_unparseable_quantities() {
    let h = Harness::new().await;
    publish_pg_and_app(&h).await;
    let mut manifest = h
        .store_manifest(vec![manifest_bundle("pg"), manifest_bundle("app")])
        .await;
    manifest.spec.cpu = "lots".to_string();
    h.client.apply(NS, &manifest).await.unwrap();

    let err = h.manifests().install(NS, "stack", true).await.unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("invalid CPU quantity 'lots'"));
    assert!(h.install_names().await.is_empty());
}

async fn mounted_config_maps(h: &Harness, job: &JobSpec) -> Vec<String> {
    let mut mounted = Vec::new();
    for mount in &job.mounts {
        let stored = h.client.get::<ConfigMap>(NS, &mount.config_map).await.unwrap();
        assert!(stored.is_some(), "'{}' mounts missing '{}'", job.name, mount.config_map);
        mounted.push(mount.config_map.clone());
    }
    mounted
}

fn job_named(jobs: &[JobSpec], name: &str) -> JobSpec {
    jobs.iter()
        .find(|j| j.name == name)
        .cloned()
        .unwrap_or_else(|| panic!("no job named '{name}'"))
}

#[tokio::test]
async fn manifest_requires_decide_the_mounted_inputs() {
    let h = Harness::new().await;
    publish_pg_and_app(&h).await;
    let mut app_bundle = manifest_bundle("app");
    app_bundle.requires = vec![requirement("pg", "")];
    h.store_manifest(vec![manifest_bundle("pg"), app_bundle]).await;
    let manifests = h.manifests();

    manifests.install(NS, "stack", false).await.unwrap();
    manifests.deploy(NS, "stack", TIMEOUT, false).await.unwrap();

    assert_eq!(h.install_names().await, vec!["app", "pg"]);
    let app = job_named(&h.runtime.created_jobs().await, "app");
    assert_eq!(mounted_config_maps(&h, &app).await, vec!["app-config", "pg-config"]);
    let config = h.client.require::<ConfigMap>(NS, "app-config").await.unwrap().value;
    let requires: Vec<Requirement> = serde_json::from_str(&config.data["requires.json"]).unwrap();
    assert_eq!(requires, vec![requirement("pg", "")]);
}

#[tokio::test]
async fn capability_requirement_mounts_the_provider() {
    let h = Harness::new().await;
    let mut postgres = application("postgres", vec![]);
    postgres.provides = vec![Provides {
        name: "database".to_string(),
        outputs: vec![],
    }];
    h.publish(&postgres).await;
    h.publish(&application("app", vec![requirement("database", "")]))
        .await;
    h.store_manifest(vec![manifest_bundle("app"), manifest_bundle("postgres")])
        .await;
    let manifests = h.manifests();

    let plan = manifests.install(NS, "stack", false).await.unwrap();
    assert_eq!(
        plan.layers,
        vec![vec!["postgres".to_string()], vec!["app".to_string()]]
    );
    manifests.deploy(NS, "stack", TIMEOUT, false).await.unwrap();

    let app = job_named(&h.runtime.created_jobs().await, "app");
    assert_eq!(
        mounted_config_maps(&h, &app).await,
        vec!["app-config", "postgres-config"]
    );
    assert_eq!(app.mounts[1].mount_path, "/config/inputs/postgres");
    let config = h.client.require::<ConfigMap>(NS, "app-config").await.unwrap().value;
    assert!(config.data["requires.json"].contains("\"postgres\""));
}

struct PanickingSink;

impl LogSink for PanickingSink {
    fn write(&self, _chunk: &[u8]) {
        panic!("sink unavailable");
    }
}

#[tokio::test]
async fn crashed_worker_is_reported_under_its_install() {
    let h = Harness::new().await;
    h.publish(&application("solo", vec![])).await;
    h.store_manifest(vec![manifest_bundle("solo")]).await;
    h.runtime.script_job("solo", JobScript::complete("hello\n")).await;
    let deployer = DeployManager::new(h.client.clone(), h.runtime(), &h.config)
        .with_sink(Arc::new(PanickingSink));
    let manifests = ManifestManager::new(h.client.clone(), h.runtime(), deployer, &h.config);
    manifests.install(NS, "stack", false).await.unwrap();

    let err = manifests.deploy(NS, "stack", TIMEOUT, true).await.unwrap_err();

    match err.root() {
        EngineError::Layer { layer, errors } => {
            assert_eq!(*layer, 0);
            assert_eq!(errors.len(), 1);
            assert!(errors[0].to_string().contains("install 'solo'"));
        }
        other => panic!("expected layer error, got {other}"),
    }
}

#[tokio::test]
async fn deploy_runs_layers_in_dependency_order() {
    let h = Harness::new().await;
    publish_pg_and_app(&h).await;
    h.store_manifest(vec![manifest_bundle("app"), manifest_bundle("pg")])
        .await;
    let manifests = h.manifests();
    manifests.install(NS, "stack", false).await.unwrap();

    manifests.deploy(NS, "stack", TIMEOUT, false).await.unwrap();

    let jobs = h.runtime.created_jobs().await;
    let order: Vec<(&str, &[String])> = jobs
        .iter()
        .map(|j| (j.name.as_str(), j.args.as_slice()))
        .collect();
    let apply_outputs = ["apply".to_string(), "outputs".to_string()];
    assert_eq!(
        order,
        vec![
            ("pg-primary", &apply_outputs[..]),
            ("app", &apply_outputs[..]),
        ]
    );
}

#[tokio::test]
async fn layer_failures_are_aggregated_and_stop_later_layers() {
    let mut h = Harness::new().await;
    h.config.parallelism = 2;
    h.publish(&application("cache", vec![])).await;
    h.publish(&application("queue", vec![])).await;
    h.publish(&application(
        "app",
        vec![requirement("cache", ""), requirement("queue", "")],
    ))
    .await;
    h.store_manifest(vec![
        manifest_bundle("app"),
        manifest_bundle("cache"),
        manifest_bundle("queue"),
    ])
    .await;
    h.runtime.script_job("cache", JobScript::failed("cache down\n")).await;
    h.runtime.script_job("queue", JobScript::failed("queue down\n")).await;
    let manifests = h.manifests();
    manifests.install(NS, "stack", false).await.unwrap();

    let err = manifests
        .deploy(NS, "stack", TIMEOUT, false)
        .await
        .unwrap_err();

    match err.root() {
        EngineError::Layer { layer, errors } => {
            assert_eq!(*layer, 0);
            assert_eq!(errors.len(), 2);
            assert!(errors[0].to_string().contains("'cache'"));
            assert!(errors[1].to_string().contains("'queue'"));
        }
        other => panic!("expected layer error, got {other}"),
    }
    assert!(err.is_deploy_failed());
    let names: Vec<String> = h
        .runtime
        .created_jobs()
        .await
        .into_iter()
        .map(|j| j.name)
        .collect();
    assert!(!names.contains(&"app".to_string()));

    let output = h.sink.contents();
    assert_eq!(output.matches("cache down").count(), 1);
    assert_eq!(output.matches("queue down").count(), 1);
}

#[tokio::test]
async fn deploy_smoketest_and_diff_cover_every_install() {
    let h = Harness::new().await;
    publish_pg_and_app(&h).await;
    h.store_manifest(vec![manifest_bundle("pg"), manifest_bundle("app")])
        .await;
    let manifests: ManifestManager = h.manifests();
    manifests.install(NS, "stack", false).await.unwrap();

    manifests
        .deploy_smoketest(NS, "stack", TIMEOUT, false)
        .await
        .unwrap();
    let names: Vec<String> = h
        .runtime
        .created_jobs()
        .await
        .into_iter()
        .map(|j| j.name)
        .collect();
    assert_eq!(
        names,
        vec!["pg-primary", "pg-primary-smoketest", "app", "app-smoketest"]
    );

    h.runtime.script_job("app", JobScript::complete("~ app\n")).await;
    h.runtime
        .script_job("pg-primary", JobScript::complete("~ pg\n"))
        .await;
    manifests.diff(NS, "stack", TIMEOUT).await.unwrap();
    assert_eq!(h.sink.contents(), "~ pg\n~ app\n");
}

#[tokio::test]
async fn deploy_without_registered_applications_is_not_found() {
    let h = Harness::new().await;
    h.store_manifest(vec![manifest_bundle("pg")]).await;
    let err = h
        .manifests()
        .deploy(NS, "stack", TIMEOUT, false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
