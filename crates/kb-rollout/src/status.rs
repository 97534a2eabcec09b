//! Rollout-complete predicates, one per workload kind.
//!
//! Each predicate looks at a single observed state and answers whether the
//! workload has converged. Waiting states carry a message for logs.

use kb_cluster::{
    CronJobState, DaemonSetState, DeploymentState, JobConditionType, JobStatus, StatefulSetState,
    WorkloadState,
};

use crate::error::{RolloutError, RolloutResult};

/// Outcome of one predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutProgress {
    Waiting(String),
    Complete(String),
}

impl RolloutProgress {
    pub fn is_complete(&self) -> bool {
        matches!(self, RolloutProgress::Complete(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RolloutProgress::Waiting(msg) | RolloutProgress::Complete(msg) => msg,
        }
    }
}

/// Evaluate the predicate matching the observed state.
pub fn rollout_status(name: &str, state: &WorkloadState) -> RolloutResult<RolloutProgress> {
    match state {
        WorkloadState::Deployment(d) => deployment_status(name, d),
        WorkloadState::StatefulSet(s) => Ok(statefulset_status(name, s)),
        WorkloadState::DaemonSet(d) => Ok(daemonset_status(name, d)),
        WorkloadState::Job(j) => job_status(name, j),
        WorkloadState::CronJob(c) => Ok(cronjob_status(name, c)),
    }
}

pub fn deployment_status(name: &str, d: &DeploymentState) -> RolloutResult<RolloutProgress> {
    if d.generation > d.observed_generation {
        return Ok(RolloutProgress::Waiting(format!(
            "waiting for deployment '{name}' spec update to be observed"
        )));
    }
    if d.progress_deadline_exceeded {
        return Err(RolloutError::ProgressDeadlineExceeded(name.to_string()));
    }
    let desired = d.replicas.unwrap_or(1);
    if d.updated_replicas < desired {
        return Ok(RolloutProgress::Waiting(format!(
            "waiting for deployment '{name}': {} out of {desired} new replicas have been updated",
            d.updated_replicas
        )));
    }
    if d.status_replicas > d.updated_replicas {
        return Ok(RolloutProgress::Waiting(format!(
            "waiting for deployment '{name}': {} old replicas are pending termination",
            d.status_replicas - d.updated_replicas
        )));
    }
    if d.available_replicas < d.updated_replicas {
        return Ok(RolloutProgress::Waiting(format!(
            "waiting for deployment '{name}': {} of {} updated replicas are available",
            d.available_replicas, d.updated_replicas
        )));
    }
    if d.ready_replicas < desired {
        return Ok(RolloutProgress::Waiting(format!(
            "waiting for deployment '{name}': {} of {desired} replicas are ready",
            d.ready_replicas
        )));
    }
    Ok(RolloutProgress::Complete(format!(
        "deployment '{name}' successfully rolled out"
    )))
}

pub fn statefulset_status(name: &str, s: &StatefulSetState) -> RolloutProgress {
    if s.observed_generation == 0 || s.generation > s.observed_generation {
        return RolloutProgress::Waiting(format!(
            "waiting for statefulset '{name}' spec update to be observed"
        ));
    }
    let desired = s.replicas.unwrap_or(1);
    if s.ready_replicas < desired {
        return RolloutProgress::Waiting(format!(
            "waiting for {} pods of statefulset '{name}' to be ready",
            desired - s.ready_replicas
        ));
    }
    if let Some(partition) = s.partition {
        let target = desired - partition;
        if s.updated_replicas < target {
            return RolloutProgress::Waiting(format!(
                "waiting for partitioned roll out of '{name}': {} out of {target} new pods have been updated",
                s.updated_replicas
            ));
        }
        return RolloutProgress::Complete(format!(
            "partitioned roll out of '{name}' complete: {} new pods have been updated",
            s.updated_replicas
        ));
    }
    if s.update_revision != s.current_revision {
        return RolloutProgress::Waiting(format!(
            "waiting for statefulset '{name}' rolling update to complete {} pods at revision {}",
            s.updated_replicas, s.update_revision
        ));
    }
    RolloutProgress::Complete(format!(
        "statefulset '{name}' rolling update complete {} pods at revision {}",
        s.current_replicas, s.current_revision
    ))
}

pub fn daemonset_status(name: &str, d: &DaemonSetState) -> RolloutProgress {
    if d.generation > d.observed_generation {
        return RolloutProgress::Waiting(format!(
            "waiting for daemon set '{name}' spec update to be observed"
        ));
    }
    if d.updated_number_scheduled < d.desired_number_scheduled {
        return RolloutProgress::Waiting(format!(
            "waiting for daemon set '{name}': {} out of {} new pods have been updated",
            d.updated_number_scheduled, d.desired_number_scheduled
        ));
    }
    if d.number_available < d.desired_number_scheduled {
        return RolloutProgress::Waiting(format!(
            "waiting for daemon set '{name}': {} of {} updated pods are available",
            d.number_available, d.desired_number_scheduled
        ));
    }
    RolloutProgress::Complete(format!("daemon set '{name}' successfully rolled out"))
}

pub fn job_status(name: &str, j: &JobStatus) -> RolloutResult<RolloutProgress> {
    match j.terminal_condition() {
        Some(JobConditionType::Complete) => {
            Ok(RolloutProgress::Complete(format!("job '{name}' complete")))
        }
        Some(JobConditionType::Failed) => Err(RolloutError::JobFailed(name.to_string())),
        _ => Ok(RolloutProgress::Waiting(format!(
            "waiting for job '{name}' to complete"
        ))),
    }
}

pub fn cronjob_status(name: &str, c: &CronJobState) -> RolloutProgress {
    if c.suspended {
        RolloutProgress::Waiting(format!("waiting for cronjob '{name}' to be resumed"))
    } else {
        RolloutProgress::Complete(format!("cronjob '{name}' is scheduled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converged_deployment(replicas: i32) -> DeploymentState {
        DeploymentState {
            generation: 4,
            observed_generation: 4,
            replicas: Some(replicas),
            status_replicas: replicas,
            updated_replicas: replicas,
            ready_replicas: replicas,
            available_replicas: replicas,
            progress_deadline_exceeded: false,
        }
    }

    #[test]
    fn deployment_complete_when_all_replicas_ready() {
        let progress = deployment_status("api", &converged_deployment(3)).unwrap();
        assert!(progress.is_complete());
    }

    #[test]
    fn deployment_waits_for_ready_replicas() {
        let mut d = converged_deployment(3);
        d.ready_replicas = 1;
        let progress = deployment_status("api", &d).unwrap();
        assert!(!progress.is_complete());
        assert!(progress.message().contains("1 of 3 replicas are ready"));
    }

    #[test]
    fn deployment_waits_for_observed_generation() {
        let mut d = converged_deployment(3);
        d.generation = 5;
        assert!(!deployment_status("api", &d).unwrap().is_complete());
    }

    #[test]
    fn deployment_waits_for_old_replicas_to_terminate() {
        let mut d = converged_deployment(3);
        d.status_replicas = 4;
        let progress = deployment_status("api", &d).unwrap();
        assert!(progress.message().contains("1 old replicas"));
    }

    #[test]
    fn deployment_progress_deadline_is_an_error() {
        let mut d = converged_deployment(3);
        d.progress_deadline_exceeded = true;
        assert!(matches!(
            deployment_status("api", &d),
            Err(RolloutError::ProgressDeadlineExceeded(_))
        ));
    }

    #[test]
    fn statefulset_requires_revision_convergence() {
        let mut s = StatefulSetState {
            generation: 2,
            observed_generation: 2,
            replicas: Some(3),
            ready_replicas: 3,
            updated_replicas: 3,
            current_replicas: 3,
            partition: None,
            update_revision: "db-2".to_string(),
            current_revision: "db-1".to_string(),
        };
        assert!(!statefulset_status("db", &s).is_complete());
        s.current_revision = "db-2".to_string();
        assert!(statefulset_status("db", &s).is_complete());
        s.observed_generation = 0;
        assert!(!statefulset_status("db", &s).is_complete());
    }

    #[test]
    fn statefulset_partition_limits_required_updates() {
        let s = StatefulSetState {
            generation: 1,
            observed_generation: 1,
            replicas: Some(5),
            ready_replicas: 5,
            updated_replicas: 2,
            partition: Some(3),
            update_revision: "b".to_string(),
            current_revision: "a".to_string(),
            ..Default::default()
        };
        assert!(statefulset_status("db", &s).is_complete());
    }

    #[test]
    fn daemonset_waits_for_available_pods() {
        let mut d = DaemonSetState {
            generation: 1,
            observed_generation: 1,
            desired_number_scheduled: 4,
            updated_number_scheduled: 4,
            number_available: 3,
        };
        assert!(!daemonset_status("agent", &d).is_complete());
        d.number_available = 4;
        assert!(daemonset_status("agent", &d).is_complete());
    }

    #[test]
    fn job_failure_is_an_error() {
        let failed = JobStatus {
            conditions: vec![JobConditionType::Failed],
            ..Default::default()
        };
        assert!(matches!(job_status("migrate", &failed), Err(RolloutError::JobFailed(_))));
        assert!(!job_status("migrate", &JobStatus::default()).unwrap().is_complete());
    }

    #[test]
    fn cronjob_complete_unless_suspended() {
        let mut c = CronJobState::default();
        assert!(cronjob_status("backup", &c).is_complete());
        c.suspended = true;
        assert!(!cronjob_status("backup", &c).is_complete());
    }
}
