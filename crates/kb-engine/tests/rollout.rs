mod common;

use std::time::Duration;

use common::*;
use kb_engine::{EngineError, RolloutStatusManager};

async fn manager_for(h: &Harness, kind: &str) -> RolloutStatusManager {
    let mut app = application("web", vec![]);
    app.resources = vec![declared("web", "frontend", kind)];
    h.register(&app).await;
    h.install(&app, vec![]).await;
    RolloutStatusManager::new(h.client.clone(), h.runtime(), &h.config)
}

#[tokio::test]
async fn ready_deployment_rolls_out() {
    let h = Harness::new().await;
    let rollout = manager_for(&h, "deployment").await;
    h.set_deployment("web", 3, 3).await;

    rollout
        .wait(NS, "web", Duration::from_millis(200))
        .await
        .unwrap();
}

#[tokio::test]
async fn partially_ready_deployment_times_out_naming_category() {
    let h = Harness::new().await;
    let rollout = manager_for(&h, "deployment").await;
    h.set_deployment("web", 3, 1).await;

    let err = rollout
        .wait(NS, "web", Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    match &err {
        EngineError::Timeout { target, detail, .. } => {
            assert_eq!(target, "frontend resource deployment 'web'");
            assert!(detail.contains("1 of 3 replicas are ready"));
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn unknown_resource_kind_is_a_config_error() {
    let h = Harness::new().await;
    let rollout = manager_for(&h, "replicaset").await;

    let err = rollout
        .wait(NS, "web", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert!(err
        .to_string()
        .contains("unrecognized resource rollout type: 'replicaset'"));
}
