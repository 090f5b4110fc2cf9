//! Orchestrator configuration
//!
//! Defines all configurable parameters: store and provider selection,
//! provider connection settings, and the lifecycle timings that drive
//! timer-based progression.

use std::str::FromStr;
use std::time::Duration;

use crate::events::MAX_EVENT_BUFFER;

/// Which provisioning provider adapter to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// In-process reference provider with synthetic data
    Mock,
    /// The `rift` command-line client
    Rift,
    /// The provider's REST API
    Http,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(ProviderKind::Mock),
            "rift" | "cli" => Ok(ProviderKind::Rift),
            "http" => Ok(ProviderKind::Http),
            other => Err(format!("unknown provider '{}' (expected mock, rift or http)", other)),
        }
    }
}

/// What happens to a job whose allocation fails on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationFailurePolicy {
    /// Keep the job in `Pending`; the caller decides whether to resubmit
    LeavePending,
    /// Move the job to `Failed`
    MarkFailed,
}

impl FromStr for AllocationFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave-pending" | "pending" => Ok(AllocationFailurePolicy::LeavePending),
            "mark-failed" | "failed" => Ok(AllocationFailurePolicy::MarkFailed),
            other => Err(format!(
                "unknown allocation failure policy '{}' (expected leave-pending or mark-failed)",
                other
            )),
        }
    }
}

/// Timings and policies of the job lifecycle
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Delay of the `Provisioning -> Running` timer
    pub provisioning_delay: Duration,

    /// Delay of the `Running -> Completed | Failed` timer
    pub running_delay: Duration,

    /// Probability that a `Running` job ends `Completed` rather than `Failed`.
    /// Placeholder for a real completion signal from the provider.
    pub success_ratio: f64,

    /// Upper bound of the random delay added to recovered `Running` jobs
    pub recovery_jitter: Duration,

    /// Delay before a timer retries after a failed store write
    pub store_retry_delay: Duration,

    pub allocation_failure_policy: AllocationFailurePolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            provisioning_delay: Duration::from_secs(3),
            running_delay: Duration::from_secs(12),
            success_ratio: 0.8,
            recovery_jitter: Duration::from_secs(5),
            store_retry_delay: Duration::from_secs(1),
            allocation_failure_policy: AllocationFailurePolicy::LeavePending,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provisioning_delay.is_zero() {
            anyhow::bail!("provisioning_delay must be greater than 0");
        }

        if self.running_delay.is_zero() {
            anyhow::bail!("running_delay must be greater than 0");
        }

        if self.store_retry_delay.is_zero() {
            anyhow::bail!("store_retry_delay must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.success_ratio) {
            anyhow::bail!(
                "success_ratio must be between 0 and 1 (got {})",
                self.success_ratio
            );
        }

        Ok(())
    }
}

/// Orchestrator process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL; `None` selects the in-memory store
    pub database_url: Option<String>,

    pub provider: ProviderKind,

    /// Path or name of the `rift` binary
    pub rift_binary: String,

    /// Container image started on instances allocated through `rift`
    pub rift_image: String,

    /// Base URL of the HTTP provider
    pub provider_base_url: String,

    /// Bearer token of the HTTP provider
    pub provider_api_key: String,

    /// Upper bound for a single provider call
    pub provider_timeout: Duration,

    /// Buffered events per subscriber before it starts lagging
    pub event_buffer: usize,

    pub lifecycle: LifecycleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            provider: ProviderKind::Mock,
            rift_binary: "rift".to_string(),
            rift_image: "nvidia/cuda:latest".to_string(),
            provider_base_url: "https://api.cloudrift.io".to_string(),
            provider_api_key: String::new(),
            provider_timeout: Duration::from_secs(30),
            event_buffer: 1024,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - DATABASE_URL (unset: in-memory store)
    /// - GANTRY_PROVIDER (mock | rift | http, default: mock)
    /// - RIFT_BINARY (default: rift)
    /// - RIFT_IMAGE (default: nvidia/cuda:latest)
    /// - CLOUDRIFT_BASE_URL (default: https://api.cloudrift.io)
    /// - CLOUDRIFT_API_KEY
    /// - PROVIDER_TIMEOUT (seconds, default: 30)
    /// - PROVISIONING_DELAY_MS (default: 3000)
    /// - RUNNING_DELAY_MS (default: 12000)
    /// - SUCCESS_RATIO (default: 0.8)
    /// - RECOVERY_JITTER_MS (default: 5000)
    /// - STORE_RETRY_DELAY_MS (default: 1000)
    /// - ALLOCATION_FAILURE_POLICY (leave-pending | mark-failed)
    /// - EVENT_BUFFER (default: 1024)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let lifecycle_defaults = LifecycleConfig::default();

        let provider = match std::env::var("GANTRY_PROVIDER") {
            Ok(raw) => raw.parse::<ProviderKind>().map_err(anyhow::Error::msg)?,
            Err(_) => defaults.provider,
        };

        let allocation_failure_policy = match std::env::var("ALLOCATION_FAILURE_POLICY") {
            Ok(raw) => raw
                .parse::<AllocationFailurePolicy>()
                .map_err(anyhow::Error::msg)?,
            Err(_) => lifecycle_defaults.allocation_failure_policy,
        };

        let lifecycle = LifecycleConfig {
            provisioning_delay: env_millis("PROVISIONING_DELAY_MS")
                .unwrap_or(lifecycle_defaults.provisioning_delay),
            running_delay: env_millis("RUNNING_DELAY_MS")
                .unwrap_or(lifecycle_defaults.running_delay),
            success_ratio: env_parse::<f64>("SUCCESS_RATIO")
                .unwrap_or(lifecycle_defaults.success_ratio),
            recovery_jitter: env_millis("RECOVERY_JITTER_MS")
                .unwrap_or(lifecycle_defaults.recovery_jitter),
            store_retry_delay: env_millis("STORE_RETRY_DELAY_MS")
                .unwrap_or(lifecycle_defaults.store_retry_delay),
            allocation_failure_policy,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            provider,
            rift_binary: std::env::var("RIFT_BINARY").unwrap_or(defaults.rift_binary),
            rift_image: std::env::var("RIFT_IMAGE").unwrap_or(defaults.rift_image),
            provider_base_url: std::env::var("CLOUDRIFT_BASE_URL")
                .unwrap_or(defaults.provider_base_url),
            provider_api_key: std::env::var("CLOUDRIFT_API_KEY").unwrap_or_default(),
            provider_timeout: env_parse::<u64>("PROVIDER_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            event_buffer: env_parse::<usize>("EVENT_BUFFER").unwrap_or(defaults.event_buffer),
            lifecycle,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.lifecycle.validate()?;

        match self.provider {
            ProviderKind::Rift if self.rift_binary.is_empty() => {
                anyhow::bail!("rift_binary cannot be empty");
            }
            ProviderKind::Http
                if !self.provider_base_url.starts_with("http://")
                    && !self.provider_base_url.starts_with("https://") =>
            {
                anyhow::bail!("provider_base_url must start with http:// or https://");
            }
            _ => {}
        }

        if self.provider_timeout.is_zero() {
            anyhow::bail!("provider_timeout must be greater than 0");
        }

        if self.event_buffer == 0 || self.event_buffer > MAX_EVENT_BUFFER {
            anyhow::bail!("event_buffer must be between 1 and {}", MAX_EVENT_BUFFER);
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
