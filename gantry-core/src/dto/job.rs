//! Job DTOs for the submission path

use serde::{Deserialize, Serialize};

use crate::domain::instance::InstanceStatus;
use crate::domain::job::{Job, Requirements};

/// Request to submit a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    #[serde(default)]
    pub owner: Option<String>,
    pub model_type: String,
    pub resource_type: String,
    #[serde(default)]
    pub requirements: Requirements,
}

impl SubmitJob {
    pub fn new(model_type: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            owner: None,
            model_type: model_type.into(),
            resource_type: resource_type.into(),
            requirements: Requirements::new(),
        }
    }
}

/// Persisted job plus a live provider snapshot, if the job has an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job: Job,
    pub instance: Option<InstanceStatus>,
}
