//! Recovery
//!
//! Rebuilds timers from the store after a restart. Run once at process
//! start, before any submission traffic is accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gantry_core::domain::job::JobState;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::service::lifecycle::LifecycleOrchestrator;

/// Jobs found in each non-terminal state by [`RecoveryManager::resume`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Re-armed with the full provisioning delay
    pub provisioning: usize,
    /// Re-armed with the running delay plus jitter
    pub running: usize,
    /// Left alone: a pending job has no timer to restore
    pub pending: usize,
}

impl RecoveryReport {
    pub fn resumed(&self) -> usize {
        self.provisioning + self.running
    }
}

pub struct RecoveryManager {
    orchestrator: Arc<LifecycleOrchestrator>,
    jitter_max: Duration,
    resumed: AtomicBool,
}

impl RecoveryManager {
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>, jitter_max: Duration) -> Self {
        Self {
            orchestrator,
            jitter_max,
            resumed: AtomicBool::new(false),
        }
    }

    /// Re-arm the timer of every `Provisioning` and `Running` job
    ///
    /// A second call returns an empty report without touching any timer.
    pub async fn resume(&self) -> Result<RecoveryReport, StoreError> {
        if self.resumed.swap(true, Ordering::SeqCst) {
            warn!("Recovery already ran, ignoring");
            return Ok(RecoveryReport::default());
        }

        let jobs = self
            .orchestrator
            .store()
            .list_in_states(&[JobState::Pending, JobState::Provisioning, JobState::Running])
            .await;
        let jobs = match jobs {
            Ok(jobs) => jobs,
            Err(e) => {
                // Allow a retry once the store is back
                self.resumed.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let mut report = RecoveryReport::default();
        for job in &jobs {
            match job.state {
                JobState::Provisioning => {
                    self.orchestrator.resume_timer(job, Duration::ZERO);
                    report.provisioning += 1;
                }
                JobState::Running => {
                    self.orchestrator.resume_timer(job, self.jitter());
                    report.running += 1;
                }
                _ => {
                    warn!(
                        "Job {} is still pending after restart; it needs a new submission",
                        job.id
                    );
                    report.pending += 1;
                }
            }
        }

        info!(
            "Recovery complete: {} provisioning, {} running, {} pending",
            report.provisioning, report.running, report.pending
        );
        Ok(report)
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max.is_zero() {
            return Duration::ZERO;
        }
        self.jitter_max.mul_f64(rand::random::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::events::EventBus;
    use crate::repository::{InMemoryJobStore, JobStore};
    use gantry_core::domain::job::Job;
    use gantry_core::dto::job::SubmitJob;
    use gantry_provider::MockProvider;

    async fn seeded(states: &[JobState]) -> (Arc<LifecycleOrchestrator>, Arc<InMemoryJobStore>) {
        let store = Arc::new(InMemoryJobStore::new());
        for state in states {
            let mut job = Job::new(SubmitJob::new("whisper", "RTX 4090"));
            job.state = *state;
            store.insert(&job).await.unwrap();
        }
        let config = LifecycleConfig {
            provisioning_delay: Duration::from_secs(60),
            running_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let orchestrator = LifecycleOrchestrator::new(
            store.clone(),
            Arc::new(MockProvider::new()),
            EventBus::default(),
            config,
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_resume_rearms_active_jobs_only() {
        let (orchestrator, _) = seeded(&[
            JobState::Pending,
            JobState::Provisioning,
            JobState::Running,
            JobState::Running,
            JobState::Completed,
            JobState::Stopped,
        ])
        .await;
        let recovery = RecoveryManager::new(orchestrator.clone(), Duration::from_millis(50));

        let report = recovery.resume().await.unwrap();
        assert_eq!(
            report,
            RecoveryReport {
                provisioning: 1,
                running: 2,
                pending: 1,
            }
        );
        assert_eq!(report.resumed(), 3);
        assert_eq!(orchestrator.active_timer_count(), 3);
    }

    #[tokio::test]
    async fn test_second_resume_is_noop() {
        let (orchestrator, store) = seeded(&[JobState::Running]).await;
        let recovery = RecoveryManager::new(orchestrator.clone(), Duration::ZERO);

        assert_eq!(recovery.resume().await.unwrap().running, 1);
        assert_eq!(recovery.resume().await.unwrap(), RecoveryReport::default());
        assert_eq!(orchestrator.active_timer_count(), 1);

        let running = store.list_in_states(&[JobState::Running]).await.unwrap();
        assert!(orchestrator.has_active_timer(running[0].id));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(MockProvider::new()),
            EventBus::default(),
            LifecycleConfig::default(),
        );
        let recovery = RecoveryManager::new(orchestrator, Duration::from_millis(100));
        for _ in 0..50 {
            assert!(recovery.jitter() <= Duration::from_millis(100));
        }
    }
}
