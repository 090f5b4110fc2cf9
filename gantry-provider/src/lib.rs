//! Gantry Provisioning Providers
//!
//! The capability the orchestrator depends on to allocate, inspect and
//! terminate remote accelerator instances, plus the adapters that implement it.
//!
//! - [`RiftCliProvider`] drives the `rift` command-line client
//! - [`HttpProvider`] talks to the provider's REST API
//! - [`MockProvider`] returns deterministic synthetic data for tests and demos
//!
//! Every call may fail. Callers should treat [`ProviderError::Unavailable`]
//! as "unknown, retry later" and everything else as a definite answer.
//!
//! # Example
//!
//! ```no_run
//! use gantry_provider::{MockProvider, ProvisioningProvider};
//! use gantry_core::domain::job::Requirements;
//!
//! # async fn example() -> gantry_provider::Result<()> {
//! let provider = MockProvider::new();
//! let instance_id = provider.allocate("A100", &Requirements::new()).await?;
//! let status = provider.status(&instance_id).await?;
//! println!("{} is {}", status.id, status.status);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod cli;
pub mod error;
mod http;
mod mock;

// Re-export commonly used types
pub use cli::RiftCliProvider;
pub use error::{ProviderError, Result};
pub use http::HttpProvider;
pub use mock::MockProvider;

use async_trait::async_trait;
use gantry_core::domain::instance::{GpuAvailability, GpuMetrics, GpuPricing, InstanceStatus};
use gantry_core::domain::job::Requirements;

/// Remote accelerator provider
#[async_trait]
pub trait ProvisioningProvider: Send + Sync {
    /// Allocates an instance of `resource_type`
    ///
    /// # Returns
    /// The provider's instance id
    async fn allocate(&self, resource_type: &str, requirements: &Requirements) -> Result<String>;

    /// Fetches the current status of an instance
    async fn status(&self, instance_id: &str) -> Result<InstanceStatus>;

    /// Terminates an instance
    async fn terminate(&self, instance_id: &str) -> Result<()>;

    /// Lists GPU types with their current availability
    async fn list_available(&self) -> Result<Vec<GpuAvailability>>;

    /// Lists GPU types with price and spec
    async fn pricing(&self) -> Result<Vec<GpuPricing>>;

    /// Fetches live utilization metrics of an instance
    async fn metrics(&self, instance_id: &str) -> Result<GpuMetrics>;
}
