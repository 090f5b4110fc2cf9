//! Serve command
//!
//! Runs recovery once, then logs every lifecycle event until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use gantry_orchestrator::{Config, LifecycleOrchestrator, RecoveryManager};

pub async fn run(orchestrator: &Arc<LifecycleOrchestrator>, config: &Config) -> Result<()> {
    tracing::info!("Starting Gantry orchestrator...");

    // Subscribe first so events of recovered jobs are not missed
    let mut events = orchestrator.subscribe(None);

    let recovery = RecoveryManager::new(orchestrator.clone(), config.lifecycle.recovery_jitter);
    let report = recovery
        .resume()
        .await
        .context("Failed to recover active jobs")?;
    tracing::info!("Resumed {} active job(s)", report.resumed());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => match &event.instance_id {
                    Some(instance) => tracing::info!(
                        "Job {} -> {} (instance {})",
                        event.job_id, event.status, instance
                    ),
                    None => tracing::info!("Job {} -> {}", event.job_id, event.status),
                },
                None => break,
            },
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    orchestrator.shutdown();
    Ok(())
}
