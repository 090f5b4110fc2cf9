//! Provider-side snapshots
//!
//! Shapes returned by a provisioning provider. They are reported as-is and
//! never drive lifecycle transitions.

use serde::{Deserialize, Serialize};

/// Status tag used when the provider could not be reached.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Point-in-time view of a provider instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl InstanceStatus {
    /// Synthetic snapshot for an instance whose status could not be fetched.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: UNKNOWN_STATUS.to_string(),
            uptime: None,
            ip_address: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.status == UNKNOWN_STATUS
    }
}

/// How many instances of a GPU type can be allocated right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuAvailability {
    #[serde(rename = "type")]
    pub gpu_type: String,
    pub available: u32,
}

/// Catalog price of a GPU type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuPricing {
    #[serde(rename = "type")]
    pub gpu_type: String,
    pub price_per_hour: f64,
    pub memory: String,
    pub compute: String,
}

/// Device memory usage in GB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: f64,
    pub total: f64,
}

/// Live utilization of a provisioned instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuMetrics {
    /// Percent, 0-100.
    pub utilization: f64,
    pub memory: MemoryUsage,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Watts.
    pub power_usage: f64,
}
