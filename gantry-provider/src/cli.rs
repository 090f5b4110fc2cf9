//! `rift` command-line provider
//!
//! Drives the provider's CLI:
//! - `rift docker run --gpu-type <type> --detach <image>` allocates (stdout = instance id)
//! - `rift status <id>` reports instance status as JSON
//! - `rift stop <id>` terminates
//! - `rift list-gpus --available` lists availability as JSON
//! - `rift metrics <id>` reports utilization as JSON
//!
//! A failed spawn or a timeout is reported as [`ProviderError::Unavailable`],
//! a non-zero exit as [`ProviderError::Rejected`]. Nothing falls back to
//! made-up data.

use std::time::Duration;

use async_trait::async_trait;
use gantry_core::domain::instance::{GpuAvailability, GpuMetrics, GpuPricing, InstanceStatus};
use gantry_core::domain::job::Requirements;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, info};

use crate::ProvisioningProvider;
use crate::catalog;
use crate::error::{ProviderError, Result};

/// Provider backed by the `rift` CLI
#[derive(Debug, Clone)]
pub struct RiftCliProvider {
    /// Path or name of the CLI binary
    binary: String,
    /// Container image started on allocated instances
    image: String,
    /// Upper bound for a single CLI invocation
    timeout: Duration,
}

impl RiftCliProvider {
    pub fn new(binary: impl Into<String>, image: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            image: image.into(),
            timeout,
        }
    }

    /// Runs the CLI with `args` and returns its stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                ProviderError::Unavailable(format!(
                    "'{} {}' timed out after {:?}",
                    self.binary,
                    args.first().copied().unwrap_or_default(),
                    self.timeout
                ))
            })?
            .map_err(|e| {
                ProviderError::Unavailable(format!("Failed to execute '{}': {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let message = if stderr.is_empty() { stdout } else { stderr };
            return Err(ProviderError::rejected(
                output.status.code().unwrap_or(-1),
                message,
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let stdout = self.run(args).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| {
            ProviderError::Parse(format!(
                "'{} {}' returned invalid JSON: {}",
                self.binary,
                args.join(" "),
                e
            ))
        })
    }
}

#[async_trait]
impl ProvisioningProvider for RiftCliProvider {
    async fn allocate(&self, resource_type: &str, requirements: &Requirements) -> Result<String> {
        if !requirements.is_empty() {
            debug!(
                "rift CLI ignores {} requirement(s) for {}",
                requirements.len(),
                resource_type
            );
        }

        let stdout = self
            .run(&[
                "docker",
                "run",
                "--gpu-type",
                resource_type,
                "--detach",
                &self.image,
            ])
            .await?;

        let instance_id = stdout.trim();
        if instance_id.is_empty() {
            return Err(ProviderError::Parse(
                "rift returned an empty instance id".to_string(),
            ));
        }

        info!("Allocated {} instance {}", resource_type, instance_id);
        Ok(instance_id.to_string())
    }

    async fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        self.run_json(&["status", instance_id]).await
    }

    async fn terminate(&self, instance_id: &str) -> Result<()> {
        self.run(&["stop", instance_id]).await?;
        info!("Stopped instance {}", instance_id);
        Ok(())
    }

    async fn list_available(&self) -> Result<Vec<GpuAvailability>> {
        self.run_json(&["list-gpus", "--available"]).await
    }

    async fn pricing(&self) -> Result<Vec<GpuPricing>> {
        Ok(catalog::default_pricing())
    }

    async fn metrics(&self, instance_id: &str) -> Result<GpuMetrics> {
        self.run_json(&["metrics", instance_id]).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn provider(binary: &str) -> RiftCliProvider {
        RiftCliProvider::new(binary, "nvidia/cuda:latest", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let err = provider("/nonexistent/rift")
            .allocate("A100", &Requirements::new())
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_rejected() {
        let err = provider("false").terminate("gpu-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { status: 1, .. }), "{err}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_allocate_passes_gpu_type_and_image() {
        // `echo` prints its arguments, standing in for the instance id.
        let id = provider("echo")
            .allocate("A100", &Requirements::new())
            .await
            .unwrap();
        assert_eq!(id, "docker run --gpu-type A100 --detach nvidia/cuda:latest");
    }

    #[tokio::test]
    async fn test_status_requires_json() {
        let err = provider("echo").status("gpu-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)), "{err}");
    }

    #[tokio::test]
    async fn test_pricing_uses_catalog() {
        let pricing = provider("/nonexistent/rift").pricing().await.unwrap();
        assert_eq!(pricing, catalog::default_pricing());
    }
}
