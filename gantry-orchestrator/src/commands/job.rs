//! Job command handlers
//!
//! Handles submission, stop requests, status views and listings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use gantry_core::domain::job::{Job, JobState};
use gantry_core::dto::job::SubmitJob;
use gantry_orchestrator::{LifecycleOrchestrator, Subscription};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Parse a `key=value` requirement
///
/// The value is read as JSON when it parses (`vram=80`, `spot=true`) and kept
/// as a string otherwise.
pub fn parse_requirement(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// How often a waiting `submit` re-reads the job from the store
const SETTLE_POLL: Duration = Duration::from_secs(1);

/// Submit a job and drive it until it ends
///
/// Timers are owned by this process, so the command stays up until the job
/// is terminal. `follow` only controls whether events are printed. On Ctrl-C
/// the job keeps its last persisted state for `serve` to recover.
pub async fn submit(
    orchestrator: &Arc<LifecycleOrchestrator>,
    gpu_type: String,
    model_type: String,
    owner: Option<String>,
    requirements: Vec<(String, serde_json::Value)>,
    follow: bool,
) -> Result<()> {
    let mut req = SubmitJob::new(model_type, gpu_type);
    req.owner = owner;
    req.requirements = requirements.into_iter().collect();

    // Unscoped so nothing is lost before the job id is known
    let mut events = orchestrator.subscribe(None);

    let job = orchestrator
        .submit(req)
        .await
        .context("Failed to submit job")?;

    println!("{}", "Job submitted".green().bold());
    print_job_details(&job);

    if follow {
        println!("\n{}", "Events:".bold());
    }

    tokio::select! {
        state = wait_until_settled(orchestrator, &mut events, job.id, follow) => {
            let state = state?;
            println!("\n{} Job {} ended {}", "✓".green(), job.id, colorize_state(state));
        }
        _ = tokio::signal::ctrl_c() => {
            let state = orchestrator
                .get_job(job.id)
                .await
                .map(|job| job.state)
                .unwrap_or(job.state);
            orchestrator.shutdown();
            println!(
                "\n{} Interrupted with job {} {}; run `gantry serve` to resume it",
                "✗".yellow(),
                job.id,
                colorize_state(state)
            );
        }
    }

    Ok(())
}

/// Wait until a job is terminal, printing its events when `follow` is set
///
/// Events are the fast path. The store is polled too, so a job settled by
/// another orchestrator sharing the database is noticed as well.
async fn wait_until_settled(
    orchestrator: &Arc<LifecycleOrchestrator>,
    events: &mut Subscription,
    job_id: Uuid,
    follow: bool,
) -> Result<JobState> {
    let mut poll = tokio::time::interval(SETTLE_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    anyhow::bail!("Event bus closed while waiting for job {}", job_id);
                };
                if event.job_id != job_id {
                    continue;
                }
                if follow {
                    println!("  {} {}", "▸".cyan(), colorize_state(event.status));
                }
                if event.status.is_terminal() {
                    return Ok(event.status);
                }
            }
            _ = poll.tick() => {
                let job = orchestrator
                    .get_job(job_id)
                    .await
                    .context("Failed to read job")?;
                if job.is_terminal() {
                    return Ok(job.state);
                }
            }
        }
    }
}

pub async fn stop(orchestrator: &Arc<LifecycleOrchestrator>, id: Uuid) -> Result<()> {
    let stopped = orchestrator
        .request_stop(id)
        .await
        .context("Failed to stop job")?;

    if stopped {
        println!("{} Job {} stopped", "✓".green(), id);
    } else {
        println!(
            "{} Job {} is unknown or not stoppable",
            "✗".yellow(),
            id.to_string().dimmed()
        );
    }

    Ok(())
}

pub async fn status(orchestrator: &Arc<LifecycleOrchestrator>, id: Uuid) -> Result<()> {
    let view = orchestrator
        .describe(id)
        .await
        .context("Failed to get job")?;

    print_job_details(&view.job);

    if let Some(instance) = &view.instance {
        println!("\n{}", "Instance:".bold());
        println!("  ID:          {}", instance.id.cyan());
        let status = if instance.is_unknown() {
            instance.status.yellow()
        } else {
            instance.status.normal()
        };
        println!("  Status:      {}", status);
        if let Some(uptime) = &instance.uptime {
            println!("  Uptime:      {}", uptime);
        }
        if let Some(ip) = &instance.ip_address {
            println!("  IP:          {}", ip);
        }
    }

    if !view.job.audit_log.is_empty() {
        println!("\n{}", "Audit log:".bold());
        for entry in &view.job.audit_log {
            println!("  {}", entry.dimmed());
        }
    }

    Ok(())
}

pub async fn list(orchestrator: &Arc<LifecycleOrchestrator>, owner: &str) -> Result<()> {
    let jobs = orchestrator
        .list_for_owner(owner)
        .await
        .context("Failed to list jobs")?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

pub async fn metrics(orchestrator: &Arc<LifecycleOrchestrator>, id: Uuid) -> Result<()> {
    let metrics = orchestrator
        .instance_metrics(id)
        .await
        .context("Failed to get instance metrics")?;

    println!("{}", "GPU metrics:".bold());
    println!("  Utilization: {:.1}%", metrics.utilization);
    println!(
        "  Memory:      {:.1} / {:.1} GB",
        metrics.memory.used, metrics.memory.total
    );
    println!("  Temperature: {:.1} °C", metrics.temperature);
    println!("  Power:       {:.1} W", metrics.power_usage);

    Ok(())
}

/// Print a one-job summary
fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Model:    {}", job.model_type);
    println!("    GPU:      {}", job.resource.resource_type);
    println!("    State:    {}", colorize_state(job.state));
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Print detailed job information
fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Owner:       {}", job.owner);
    println!("  Model:       {}", job.model_type);
    println!("  GPU:         {}", job.resource.resource_type);
    println!("  State:       {}", colorize_state(job.state));
    if let Some(instance) = &job.provider_instance_id {
        println!("  Instance:    {}", instance);
    }
    println!("  Created:     {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:     {}", job.updated_at.format("%Y-%m-%d %H:%M:%S"));

    if !job.resource.requirements.is_empty() {
        println!("\n{}", "Requirements:".bold());
        for (key, value) in &job.resource.requirements {
            println!("  {} = {}", key.cyan(), value);
        }
    }
}

fn colorize_state(state: JobState) -> colored::ColoredString {
    let tag = state.as_str();
    match state {
        JobState::Pending => tag.yellow(),
        JobState::Provisioning => tag.blue(),
        JobState::Running => tag.cyan(),
        JobState::Completed => tag.green(),
        JobState::Failed => tag.red(),
        JobState::Stopped => tag.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::job::DEFAULT_OWNER;
    use gantry_orchestrator::{
        AllocationFailurePolicy, EventBus, InMemoryJobStore, LifecycleConfig,
    };
    use gantry_provider::MockProvider;

    fn orchestrator() -> Arc<LifecycleOrchestrator> {
        let config = LifecycleConfig {
            provisioning_delay: Duration::from_millis(20),
            running_delay: Duration::from_millis(20),
            success_ratio: 1.0,
            recovery_jitter: Duration::ZERO,
            store_retry_delay: Duration::from_millis(10),
            allocation_failure_policy: AllocationFailurePolicy::LeavePending,
        };
        LifecycleOrchestrator::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(MockProvider::new()),
            EventBus::new(64),
            config,
        )
    }

    #[tokio::test]
    async fn test_submit_without_follow_runs_job_to_completion() {
        let orchestrator = orchestrator();

        submit(
            &orchestrator,
            "A100".to_string(),
            "llama".to_string(),
            None,
            vec![("vram".to_string(), serde_json::json!(80))],
            false,
        )
        .await
        .unwrap();

        let jobs = orchestrator.list_for_owner(DEFAULT_OWNER).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Completed);
        assert_eq!(orchestrator.active_timer_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_notices_job_settled_elsewhere() {
        let orchestrator = orchestrator();
        let mut events = orchestrator.subscribe(None);
        let job = orchestrator
            .submit(SubmitJob::new("llama", "A100"))
            .await
            .unwrap();

        // Events are drained by someone else; only the store shows the end
        orchestrator.shutdown();
        assert!(orchestrator.request_stop(job.id).await.unwrap());
        while events.try_recv().is_some() {}

        let state = wait_until_settled(&orchestrator, &mut events, job.id, false)
            .await
            .unwrap();
        assert_eq!(state, JobState::Stopped);
    }

    #[test]
    fn test_parse_requirement() {
        assert_eq!(
            parse_requirement("vram=80").unwrap(),
            ("vram".to_string(), serde_json::json!(80))
        );
        assert_eq!(
            parse_requirement("region=us-east").unwrap(),
            ("region".to_string(), serde_json::json!("us-east"))
        );
        assert_eq!(
            parse_requirement("spot=true").unwrap().1,
            serde_json::json!(true)
        );
        assert!(parse_requirement("no-separator").is_err());
        assert!(parse_requirement("=1").is_err());
    }
}
