//! In-memory job store
//!
//! Used by tests and by the binary when no database is configured. Records
//! do not survive a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::domain::job::{Job, JobState, audit_entry};
use uuid::Uuid;

use super::{JobStore, StateChange, TransitionOutcome};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes a record, as an external retention policy would
    pub fn remove(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().ok().and_then(|mut jobs| jobs.remove(&id))
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&id).cloned())
    }

    async fn transition(&self, change: StateChange) -> Result<TransitionOutcome, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;

        let Some(job) = jobs.get_mut(&change.job_id) else {
            return Ok(TransitionOutcome::Missing);
        };

        if job.state != change.from {
            return Ok(TransitionOutcome::Conflict(job.state));
        }

        let now = Utc::now();
        job.state = change.to;
        if job.provider_instance_id.is_none() {
            job.provider_instance_id = change.instance_id;
        }
        job.updated_at = now;
        job.audit_log.push(audit_entry(now, &change.note));

        Ok(TransitionOutcome::Applied(job.clone()))
    }

    async fn append_audit(&self, id: Uuid, note: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        match jobs.get_mut(&id) {
            Some(job) => {
                job.audit_log.push(audit_entry(Utc::now(), note));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_in_states(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| states.contains(&job.state))
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        Ok(matching)
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut owned: Vec<Job> = jobs
            .values()
            .filter(|job| job.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::dto::job::SubmitJob;

    fn job_for(owner: &str) -> Job {
        let mut req = SubmitJob::new("bert-base", "A100");
        req.owner = Some(owner.to_string());
        Job::new(req)
    }

    fn change(job: &Job, from: JobState, to: JobState) -> StateChange {
        StateChange {
            job_id: job.id,
            from,
            to,
            instance_id: Some("gpu-1".to_string()),
            note: format!("{} -> {}", from, to),
        }
    }

    #[tokio::test]
    async fn test_transition_applies_when_state_matches() {
        let store = InMemoryJobStore::new();
        let job = job_for("alice");
        store.insert(&job).await.unwrap();

        let outcome = store
            .transition(change(&job, JobState::Pending, JobState::Provisioning))
            .await
            .unwrap();

        let TransitionOutcome::Applied(updated) = outcome else {
            panic!("expected transition to apply");
        };
        assert_eq!(updated.state, JobState::Provisioning);
        assert_eq!(updated.provider_instance_id.as_deref(), Some("gpu-1"));
        assert_eq!(updated.audit_log.len(), 2);
    }

    #[tokio::test]
    async fn test_transition_conflicts_on_stale_state() {
        let store = InMemoryJobStore::new();
        let job = job_for("alice");
        store.insert(&job).await.unwrap();

        let outcome = store
            .transition(change(&job, JobState::Running, JobState::Completed))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::Conflict(JobState::Pending)
        ));
        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().state,
            JobState::Pending
        );
    }

    #[tokio::test]
    async fn test_instance_id_is_immutable_once_set() {
        let store = InMemoryJobStore::new();
        let job = job_for("alice");
        store.insert(&job).await.unwrap();

        store
            .transition(change(&job, JobState::Pending, JobState::Provisioning))
            .await
            .unwrap();
        let mut second = change(&job, JobState::Provisioning, JobState::Running);
        second.instance_id = Some("gpu-2".to_string());
        store.transition(second).await.unwrap();

        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.provider_instance_id.as_deref(), Some("gpu-1"));
    }

    #[tokio::test]
    async fn test_missing_job() {
        let store = InMemoryJobStore::new();
        let job = job_for("alice");

        let outcome = store
            .transition(change(&job, JobState::Pending, JobState::Provisioning))
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Missing));
        assert!(!store.append_audit(job.id, "note").await.unwrap());
    }

    #[tokio::test]
    async fn test_listing() {
        let store = InMemoryJobStore::new();
        let first = job_for("alice");
        let second = job_for("alice");
        let other = job_for("bob");
        for job in [&first, &second, &other] {
            store.insert(job).await.unwrap();
        }
        store
            .transition(change(&second, JobState::Pending, JobState::Provisioning))
            .await
            .unwrap();

        let alice = store.list_for_owner("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice[0].created_at >= alice[1].created_at);

        let active = store
            .list_in_states(&JobState::ACTIVE)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }
}
