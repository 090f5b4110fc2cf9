//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod catalog;
mod job;
mod serve;

use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use gantry_core::domain::job::DEFAULT_OWNER;
use gantry_orchestrator::{Config, LifecycleOrchestrator};
use uuid::Uuid;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Recover active jobs and run the orchestrator until Ctrl-C
    Serve,
    /// Submit a new job
    Submit {
        /// GPU type to allocate (e.g. "A100")
        #[arg(long)]
        gpu_type: String,

        /// Model or workload description
        #[arg(long)]
        model_type: String,

        /// Owner of the job
        #[arg(long)]
        owner: Option<String>,

        /// Provider-specific requirement, repeatable (`key=value`)
        #[arg(short, long = "requirement", value_parser = job::parse_requirement)]
        requirements: Vec<(String, serde_json::Value)>,

        /// Print lifecycle events until the job ends
        #[arg(short, long)]
        follow: bool,
    },
    /// Stop a provisioning or running job
    Stop {
        /// Job ID
        id: Uuid,
    },
    /// Show a job and the live status of its instance
    Status {
        /// Job ID
        id: Uuid,
    },
    /// List an owner's jobs, newest first
    List {
        #[arg(long, default_value = DEFAULT_OWNER)]
        owner: String,
    },
    /// Show GPU metrics of a job's instance
    Metrics {
        /// Job ID
        id: Uuid,
    },
    /// List available GPU types
    Gpus,
    /// Show the price catalog
    Pricing,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(
    command: Commands,
    orchestrator: &Arc<LifecycleOrchestrator>,
    config: &Config,
) -> Result<()> {
    match command {
        Commands::Serve => serve::run(orchestrator, config).await,
        Commands::Submit {
            gpu_type,
            model_type,
            owner,
            requirements,
            follow,
        } => {
            job::submit(
                orchestrator,
                gpu_type,
                model_type,
                owner,
                requirements,
                follow,
            )
            .await
        }
        Commands::Stop { id } => job::stop(orchestrator, id).await,
        Commands::Status { id } => job::status(orchestrator, id).await,
        Commands::List { owner } => job::list(orchestrator, &owner).await,
        Commands::Metrics { id } => job::metrics(orchestrator, id).await,
        Commands::Gpus => catalog::list_gpus(orchestrator).await,
        Commands::Pricing => catalog::pricing(orchestrator).await,
    }
}
