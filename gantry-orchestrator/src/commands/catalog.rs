//! Catalog command handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use gantry_orchestrator::LifecycleOrchestrator;

/// List GPU types with their availability
pub async fn list_gpus(orchestrator: &Arc<LifecycleOrchestrator>) -> Result<()> {
    let gpus = orchestrator
        .available_gpus()
        .await
        .context("Failed to list available GPUs")?;

    if gpus.is_empty() {
        println!("{}", "No GPUs available.".yellow());
        return Ok(());
    }

    println!("{}", "Available GPUs:".bold());
    for gpu in gpus {
        let count = if gpu.available > 0 {
            gpu.available.to_string().green()
        } else {
            gpu.available.to_string().red()
        };
        println!("  {:<12} {}", gpu.gpu_type.cyan(), count);
    }

    Ok(())
}

/// Print the price catalog
pub async fn pricing(orchestrator: &Arc<LifecycleOrchestrator>) -> Result<()> {
    let prices = orchestrator
        .pricing()
        .await
        .context("Failed to fetch pricing")?;

    println!("{}", "Pricing:".bold());
    for price in prices {
        println!(
            "  {:<12} ${:.2}/h  {:<6} {}",
            price.gpu_type.cyan(),
            price.price_per_hour,
            price.memory,
            price.compute.dimmed()
        );
    }

    Ok(())
}
