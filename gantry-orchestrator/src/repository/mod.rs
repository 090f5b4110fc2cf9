//! Repository Module
//!
//! Durable job records. The store is the single source of truth for a job's
//! state; every state change goes through [`JobStore::transition`], a
//! compare-and-set on the current state of one record.

pub mod job;
pub mod memory;

pub use job::PgJobStore;
pub use memory::InMemoryJobStore;

use async_trait::async_trait;
use gantry_core::domain::job::{Job, JobState};
use uuid::Uuid;

use crate::error::StoreError;

/// A single state change, applied only if the record is still in `from`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub job_id: Uuid,
    pub from: JobState,
    pub to: JobState,
    /// Recorded only if the job has no instance id yet
    pub instance_id: Option<String>,
    /// Appended to the audit log when the change is applied
    pub note: String,
}

/// Result of a compare-and-set transition
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The change was written; carries the updated record
    Applied(Job),
    /// The record was no longer in the expected state
    Conflict(JobState),
    /// No record with that id
    Missing,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new job record
    async fn insert(&self, job: &Job) -> Result<(), StoreError>;

    /// Fetches a job by id
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Atomically applies `change` if the record is still in `change.from`
    async fn transition(&self, change: StateChange) -> Result<TransitionOutcome, StoreError>;

    /// Appends a diagnostic entry without touching the state
    ///
    /// # Returns
    /// `false` if the job does not exist
    async fn append_audit(&self, id: Uuid, note: &str) -> Result<bool, StoreError>;

    /// Lists jobs currently in any of `states`, oldest first
    async fn list_in_states(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError>;

    /// Lists an owner's jobs, newest first
    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Job>, StoreError>;
}
