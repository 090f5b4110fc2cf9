//! Orchestrator error types

use gantry_core::domain::job::JobState;
use gantry_provider::ProviderError;
use thiserror::Error;
use uuid::Uuid;

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt job record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Errors returned to callers of the orchestrator
///
/// Errors raised inside timer callbacks never take this path: they are
/// logged and the job stays in its last durable state.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Allocation failed on the submission path
    #[error("Provisioning failed for job {job_id}: {source}")]
    Provisioning {
        job_id: Uuid,
        #[source]
        source: ProviderError,
    },

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// The stored state changed under a synchronous request
    #[error("Job {job_id} is {state}, expected {expected}")]
    Conflict {
        job_id: Uuid,
        state: JobState,
        expected: JobState,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
