//! Job domain types
//!
//! A job moves along a fixed, forward-only graph:
//!
//! ```text
//! Pending -> Provisioning -> Running -> Completed | Failed
//!                 \              \
//!                  +-> Stopped    +-> Stopped
//! ```
//!
//! `Pending -> Failed` is only taken when allocation fails and the
//! orchestrator is configured to mark such jobs failed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dto::job::SubmitJob;

/// Owner recorded when the submission path does not name one.
pub const DEFAULT_OWNER: &str = "default-user";

/// Free-form, provider-specific requirement map.
pub type Requirements = HashMap<String, serde_json::Value>;

/// Job lifecycle state
///
/// Serialized as lowercase string tags (`"pending"`, `"provisioning"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Provisioning,
    Running,
    Completed,
    Failed,
    Stopped,
}

/// Outcome reported for a job leaving `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Internal consistency failure of the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A timer fired for a state that has no timed transition.
    #[error("no timed transition out of {0}")]
    NoTimedTransition(JobState),
}

/// A state tag that does not name any `JobState`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job state: {0}")]
pub struct UnknownState(pub String);

impl JobState {
    /// Every state, in graph order.
    pub const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Provisioning,
        JobState::Running,
        JobState::Completed,
        JobState::Failed,
        JobState::Stopped,
    ];

    /// States that own a live timer.
    pub const ACTIVE: [JobState; 2] = [JobState::Provisioning, JobState::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Provisioning => "provisioning",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }

    /// Whether an explicit stop request applies to this state.
    pub fn is_stoppable(self) -> bool {
        matches!(self, JobState::Provisioning | JobState::Running)
    }

    /// Whether `self -> to` is an edge of the lifecycle graph.
    pub fn can_transition(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Pending, JobState::Provisioning)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Provisioning, JobState::Running)
                | (JobState::Provisioning, JobState::Stopped)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Stopped)
        )
    }

    /// Target of the timed transition out of this state.
    ///
    /// `outcome` is only consulted when leaving `Running`.
    pub fn tick_target(self, outcome: RunOutcome) -> Result<JobState, TransitionError> {
        match self {
            JobState::Provisioning => Ok(JobState::Running),
            JobState::Running => Ok(match outcome {
                RunOutcome::Succeeded => JobState::Completed,
                RunOutcome::Failed => JobState::Failed,
            }),
            other => Err(TransitionError::NoTimedTransition(other)),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// The accelerator a job asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Resource type understood by the provider (e.g. "A100").
    pub resource_type: String,
    #[serde(default)]
    pub requirements: Requirements,
}

/// Job record
///
/// Persisted by the orchestrator's job store, which is the single source of
/// truth for `state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner: String,
    pub model_type: String,
    pub resource: ResourceRequest,
    pub state: JobState,
    pub provider_instance_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only diagnostic trail, one entry per durable transition.
    pub audit_log: Vec<String>,
}

impl Job {
    /// Build a fresh `Pending` job from a submission.
    pub fn new(req: SubmitJob) -> Self {
        let now = Utc::now();
        let owner = req
            .owner
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OWNER.to_string());

        Self {
            id: Uuid::new_v4(),
            owner,
            model_type: req.model_type,
            resource: ResourceRequest {
                resource_type: req.resource_type,
                requirements: req.requirements,
            },
            state: JobState::Pending,
            provider_instance_id: None,
            created_at: now,
            updated_at: now,
            audit_log: vec![audit_entry(now, "job created in pending")],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Format an audit log line.
pub fn audit_entry(at: DateTime<Utc>, message: &str) -> String {
    format!("{} {}", at.to_rfc3339(), message)
}
