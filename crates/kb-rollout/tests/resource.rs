//! DeployableResource against the in-memory runtime.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kb_cluster::{
    ContainerState, ContainerStatus, DeploymentState, MemoryRuntime, PodInfo, PodPhase,
    StatefulSetState, WorkloadKind, WorkloadState,
};
use kb_rollout::{DeployableResource, RolloutError};

const NS: &str = "default";

fn deployment(replicas: i32, ready: i32) -> WorkloadState {
    WorkloadState::Deployment(DeploymentState {
        generation: 1,
        observed_generation: 1,
        replicas: Some(replicas),
        status_replicas: replicas,
        updated_replicas: replicas,
        ready_replicas: ready,
        available_replicas: replicas,
        progress_deadline_exceeded: false,
    })
}

fn statefulset(ready: i32) -> WorkloadState {
    WorkloadState::StatefulSet(StatefulSetState {
        generation: 1,
        observed_generation: 1,
        replicas: Some(2),
        ready_replicas: ready,
        updated_replicas: 2,
        current_replicas: 2,
        partition: None,
        update_revision: "r1".to_string(),
        current_revision: "r1".to_string(),
    })
}

fn handle(runtime: &Arc<MemoryRuntime>, kind: WorkloadKind, name: &str) -> DeployableResource {
    DeployableResource::new(runtime.clone(), kind, NS, name, "app")
        .with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn deployment_with_all_replicas_ready_completes() {
    let runtime = Arc::new(MemoryRuntime::new());
    runtime
        .set_workload(NS, WorkloadKind::Deployment, "api", deployment(3, 3), BTreeMap::new())
        .await;

    handle(&runtime, WorkloadKind::Deployment, "api")
        .wait(Duration::from_millis(200))
        .await
        .unwrap();
}

#[tokio::test]
async fn deployment_with_missing_ready_replicas_times_out() {
    let runtime = Arc::new(MemoryRuntime::new());
    runtime
        .set_workload(NS, WorkloadKind::Deployment, "api", deployment(3, 1), BTreeMap::new())
        .await;

    let err = handle(&runtime, WorkloadKind::Deployment, "api")
        .wait(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    match err {
        RolloutError::Timeout { name, last_status, .. } => {
            assert_eq!(name, "api");
            assert!(last_status.contains("1 of 3"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn absent_workload_keeps_waiting() {
    let runtime = Arc::new(MemoryRuntime::new());
    let err = handle(&runtime, WorkloadKind::DaemonSet, "agent")
        .wait(Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn quorum_waits_for_every_labelled_statefulset() {
    let runtime = Arc::new(MemoryRuntime::new());
    let labels = BTreeMap::from([("app".to_string(), "pg".to_string())]);
    runtime
        .set_workload(NS, WorkloadKind::StatefulSet, "pg-1", statefulset(2), labels.clone())
        .await;
    runtime
        .set_workload(NS, WorkloadKind::StatefulSet, "pg-2", statefulset(1), labels.clone())
        .await;
    runtime
        .set_workload(NS, WorkloadKind::StatefulSet, "other", statefulset(0), BTreeMap::new())
        .await;

    let quorum = handle(&runtime, WorkloadKind::Quorum, "pg");
    assert!(quorum.needs_quorum());
    assert!(!quorum.check().await.unwrap().is_complete());

    runtime
        .set_workload(NS, WorkloadKind::StatefulSet, "pg-2", statefulset(2), labels)
        .await;
    quorum.wait(Duration::from_millis(100)).await.unwrap();

    let report = quorum.status().await.unwrap();
    assert_eq!((report.available, report.total), (4, 4));
}

#[tokio::test]
async fn service_operations_are_no_ops() {
    let runtime = Arc::new(MemoryRuntime::new());
    let service = handle(&runtime, WorkloadKind::Service, "api-svc");

    service.wait(Duration::from_millis(10)).await.unwrap();
    service.scale(3).await.unwrap();
    service.restart().await.unwrap();
    assert!(!service.delete().await.unwrap());
    assert!(service.logs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn job_cannot_be_scaled_or_restarted() {
    let runtime = Arc::new(MemoryRuntime::new());
    let job = handle(&runtime, WorkloadKind::Job, "migrate");
    assert!(matches!(
        job.scale(2).await,
        Err(RolloutError::Unsupported { operation: "scale", .. })
    ));
    assert!(matches!(
        job.restart().await,
        Err(RolloutError::Unsupported { operation: "restart", .. })
    ));
}

#[tokio::test]
async fn scale_restart_and_delete_reach_the_runtime() {
    let runtime = Arc::new(MemoryRuntime::new());
    runtime
        .set_workload(NS, WorkloadKind::Deployment, "api", deployment(1, 1), BTreeMap::new())
        .await;
    let api = handle(&runtime, WorkloadKind::Deployment, "api");

    api.scale(4).await.unwrap();
    let report = api.status().await.unwrap();
    assert_eq!(report.total, 4);

    api.restart().await.unwrap();
    assert_eq!(runtime.restarts().await, vec!["deployment/api".to_string()]);

    assert!(api.delete().await.unwrap());
    assert!(api.fetch().await.unwrap()[0].1.is_none());
}

#[tokio::test]
async fn logs_and_containers_cover_every_pod() {
    let runtime = Arc::new(MemoryRuntime::new());
    runtime
        .set_workload(NS, WorkloadKind::Deployment, "api", deployment(1, 1), BTreeMap::new())
        .await;
    let pod = PodInfo {
        name: "api-abc".to_string(),
        phase: PodPhase::Running,
        node_name: "node-1".to_string(),
        containers: vec!["api".to_string()],
        container_statuses: vec![ContainerStatus {
            name: "api".to_string(),
            state: ContainerState::Running,
            ready: true,
            restart_count: 2,
        }],
        created_at: 1,
    };
    runtime
        .set_workload_pods(NS, WorkloadKind::Deployment, "api", vec![pod], "listening on :8080\n")
        .await;

    let api = handle(&runtime, WorkloadKind::Deployment, "api");
    let logs = api.logs(Some(10)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].output, "listening on :8080\n");

    let containers = api.containers().await.unwrap();
    assert_eq!(containers[0].node, "node-1");
    assert_eq!(containers[0].status.restart_count, 2);
}
