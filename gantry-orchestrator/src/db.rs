use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            owner VARCHAR(255) NOT NULL,
            model_type VARCHAR(255) NOT NULL,
            resource_type VARCHAR(100) NOT NULL,
            requirements JSONB NOT NULL DEFAULT '{}',
            state VARCHAR(20) NOT NULL,
            provider_instance_id VARCHAR(255),
            audit_log TEXT[] NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for the owner listing, recovery scan and instance lookups
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_owner_created ON jobs(owner, created_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_provider_instance ON jobs(provider_instance_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
