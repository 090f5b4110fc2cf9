//! Gantry
//!
//! Command-line entry point: runs the orchestrator (`serve`) or performs a
//! single operation against the configured store and provider.

mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use gantry_orchestrator::{
    Config, EventBus, InMemoryJobStore, JobStore, LifecycleOrchestrator, PgJobStore, ProviderKind,
    db,
};
use gantry_provider::{HttpProvider, MockProvider, ProvisioningProvider, RiftCliProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "GPU job lifecycle orchestrator", long_about = None)]
struct Cli {
    /// Provisioning provider (mock, rift or http)
    #[arg(long, global = true, env = "GANTRY_PROVIDER")]
    provider: Option<ProviderKind>,

    /// PostgreSQL URL; jobs are kept in memory when unset
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_orchestrator=info,gantry_provider=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to read configuration")?;
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(url) = cli.database_url.filter(|url| !url.is_empty()) {
        config.database_url = Some(url);
    }
    config.validate().context("Invalid configuration")?;

    let store = build_store(&config).await?;
    let provider = build_provider(&config)?;
    let orchestrator = LifecycleOrchestrator::new(
        store,
        provider,
        EventBus::new(config.event_buffer),
        config.lifecycle.clone(),
    );

    handle_command(cli.command, &orchestrator, &config).await
}

async fn build_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
        return Ok(Arc::new(InMemoryJobStore::new()));
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    Ok(Arc::new(PgJobStore::new(pool)))
}

fn build_provider(config: &Config) -> Result<Arc<dyn ProvisioningProvider>> {
    let provider: Arc<dyn ProvisioningProvider> = match config.provider {
        ProviderKind::Mock => {
            tracing::info!("Using the mock provider");
            Arc::new(MockProvider::new())
        }
        ProviderKind::Rift => {
            tracing::info!("Using the rift CLI at {}", config.rift_binary);
            Arc::new(RiftCliProvider::new(
                &config.rift_binary,
                &config.rift_image,
                config.provider_timeout,
            ))
        }
        ProviderKind::Http => {
            tracing::info!("Using the provider API at {}", config.provider_base_url);
            let client = reqwest::Client::builder()
                .timeout(config.provider_timeout)
                .build()
                .context("Failed to build HTTP client")?;
            Arc::new(HttpProvider::with_client(
                &config.provider_base_url,
                &config.provider_api_key,
                client,
            ))
        }
    };
    Ok(provider)
}
