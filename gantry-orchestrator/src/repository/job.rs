//! Job Repository
//!
//! PostgreSQL-backed job store. Each transition is a single conditional
//! `UPDATE ... WHERE state = $from`, so concurrent writers (a stop request
//! and a timer, possibly in different processes) cannot both win.

use async_trait::async_trait;
use gantry_core::domain::job::{Job, JobState, ResourceRequest, audit_entry};
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobStore, StateChange, TransitionOutcome};
use crate::error::StoreError;

const JOB_COLUMNS: &str = "id, owner, model_type, resource_type, requirements, state, \
     provider_instance_id, audit_log, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let requirements = serde_json::to_value(&job.resource.requirements).map_err(|e| {
            StoreError::Corrupt {
                id: job.id,
                reason: format!("requirements are not serializable: {}", e),
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, owner, model_type, resource_type, requirements, state,
                              provider_instance_id, audit_log, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(&job.owner)
        .bind(&job.model_type)
        .bind(&job.resource.resource_type)
        .bind(requirements)
        .bind(job.state.as_str())
        .bind(&job.provider_instance_id)
        .bind(&job.audit_log)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn transition(&self, change: StateChange) -> Result<TransitionOutcome, StoreError> {
        let now = chrono::Utc::now();

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET state = $1,
                provider_instance_id = COALESCE(provider_instance_id, $2),
                audit_log = array_append(audit_log, $3),
                updated_at = $4
            WHERE id = $5 AND state = $6
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(change.to.as_str())
        .bind(&change.instance_id)
        .bind(audit_entry(now, &change.note))
        .bind(now)
        .bind(change.job_id)
        .bind(change.from.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Applied(Job::try_from(row)?));
        }

        // Nothing updated: tell a lost race apart from a missing record
        match self.get(change.job_id).await? {
            Some(current) => Ok(TransitionOutcome::Conflict(current.state)),
            None => Ok(TransitionOutcome::Missing),
        }
    }

    async fn append_audit(&self, id: Uuid, note: &str) -> Result<bool, StoreError> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET audit_log = array_append(audit_log, $1), updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(audit_entry(now, note))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_in_states(&self, states: &[JobState]) -> Result<Vec<Job>, StoreError> {
        let tags: Vec<&str> = states.iter().map(|s| s.as_str()).collect();

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE state = ANY($1) ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .bind(&tags)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE owner = $1 ORDER BY created_at DESC",
            JOB_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    owner: String,
    model_type: String,
    resource_type: String,
    requirements: serde_json::Value,
    state: String,
    provider_instance_id: Option<String>,
    audit_log: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|e| StoreError::Corrupt {
                id: row.id,
                reason: e.to_string(),
            })?;

        let requirements =
            serde_json::from_value(row.requirements).map_err(|e| StoreError::Corrupt {
                id: row.id,
                reason: format!("requirements are not a map: {}", e),
            })?;

        Ok(Job {
            id: row.id,
            owner: row.owner,
            model_type: row.model_type,
            resource: ResourceRequest {
                resource_type: row.resource_type,
                requirements,
            },
            state,
            provider_instance_id: row.provider_instance_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            audit_log: row.audit_log,
        })
    }
}
