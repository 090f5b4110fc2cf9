//! Lifecycle event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobState};

/// State-change notification published after every durable transition
///
/// Wire shape: `{"jobId": "...", "status": "running", "instanceId": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub job_id: Uuid,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl LifecycleEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.state,
            instance_id: job.provider_instance_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = LifecycleEvent {
            job_id: Uuid::nil(),
            status: JobState::Provisioning,
            instance_id: Some("gpu-123".to_string()),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], Uuid::nil().to_string());
        assert_eq!(json["status"], "provisioning");
        assert_eq!(json["instanceId"], "gpu-123");
    }

    #[test]
    fn test_event_omits_missing_instance() {
        let event = LifecycleEvent {
            job_id: Uuid::nil(),
            status: JobState::Failed,
            instance_id: None,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("instanceId").is_none());
    }
}
