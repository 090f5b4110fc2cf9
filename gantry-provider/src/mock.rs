//! Reference provider
//!
//! Deterministic in-process provider used by tests and by the binary when no
//! real provider is configured. Instance ids are `gpu-1`, `gpu-2`, ... unless
//! scripted with [`MockProvider::with_instance_ids`]. Failures are switched on
//! explicitly and are always reported as transient.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use gantry_core::domain::instance::{
    GpuAvailability, GpuMetrics, GpuPricing, InstanceStatus, MemoryUsage,
};
use gantry_core::domain::job::Requirements;

use crate::ProvisioningProvider;
use crate::catalog;
use crate::error::{ProviderError, Result};

#[derive(Debug, Default)]
pub struct MockProvider {
    next_id: AtomicU64,
    scripted_ids: Mutex<VecDeque<String>>,
    allocated: Mutex<Vec<String>>,
    terminated: Mutex<Vec<String>>,
    fail_allocate: AtomicBool,
    fail_status: AtomicBool,
    fail_terminate: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out these ids, in order, before falling back to `gpu-N`.
    pub fn with_instance_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        if let Ok(mut queue) = provider.scripted_ids.lock() {
            queue.extend(ids.into_iter().map(Into::into));
        }
        provider
    }

    pub fn fail_allocate(&self, fail: bool) {
        self.fail_allocate.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn fail_terminate(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    /// Instance ids handed out so far.
    pub fn allocated(&self) -> Vec<String> {
        self.allocated
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Instance ids passed to `terminate`, including failed attempts.
    pub fn terminated(&self) -> Vec<String> {
        self.terminated
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    fn next_instance_id(&self) -> String {
        let scripted = self
            .scripted_ids
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        scripted.unwrap_or_else(|| {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            format!("gpu-{}", n)
        })
    }

    fn offline(call: &str) -> ProviderError {
        ProviderError::Unavailable(format!("mock provider offline ({})", call))
    }
}

#[async_trait]
impl ProvisioningProvider for MockProvider {
    async fn allocate(&self, _resource_type: &str, _requirements: &Requirements) -> Result<String> {
        if self.fail_allocate.load(Ordering::SeqCst) {
            return Err(Self::offline("allocate"));
        }

        let id = self.next_instance_id();
        if let Ok(mut allocated) = self.allocated.lock() {
            allocated.push(id.clone());
        }
        Ok(id)
    }

    async fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Self::offline("status"));
        }

        let known = self
            .allocated
            .lock()
            .map(|ids| ids.iter().any(|id| id == instance_id))
            .unwrap_or(false);
        if !known {
            return Err(ProviderError::NotFound(instance_id.to_string()));
        }

        let stopped = self
            .terminated
            .lock()
            .map(|ids| ids.iter().any(|id| id == instance_id))
            .unwrap_or(false);

        Ok(InstanceStatus {
            id: instance_id.to_string(),
            status: if stopped { "stopped" } else { "running" }.to_string(),
            uptime: Some("2h 30m".to_string()),
            ip_address: Some("192.168.1.100".to_string()),
        })
    }

    async fn terminate(&self, instance_id: &str) -> Result<()> {
        if let Ok(mut terminated) = self.terminated.lock() {
            terminated.push(instance_id.to_string());
        }
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(Self::offline("terminate"));
        }
        Ok(())
    }

    async fn list_available(&self) -> Result<Vec<GpuAvailability>> {
        Ok([("RTX 4090", 5), ("A100", 2), ("H100", 1)]
            .into_iter()
            .map(|(gpu_type, available)| GpuAvailability {
                gpu_type: gpu_type.to_string(),
                available,
            })
            .collect())
    }

    async fn pricing(&self) -> Result<Vec<GpuPricing>> {
        Ok(catalog::default_pricing())
    }

    async fn metrics(&self, instance_id: &str) -> Result<GpuMetrics> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Self::offline("metrics"));
        }
        if !self.allocated().iter().any(|id| id == instance_id) {
            return Err(ProviderError::NotFound(instance_id.to_string()));
        }

        Ok(GpuMetrics {
            utilization: 75.0,
            memory: MemoryUsage {
                used: 12.0,
                total: 24.0,
            },
            temperature: 70.0,
            power_usage: 250.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_ids() {
        let provider = MockProvider::new();
        let reqs = Requirements::new();
        assert_eq!(provider.allocate("A100", &reqs).await.unwrap(), "gpu-1");
        assert_eq!(provider.allocate("A100", &reqs).await.unwrap(), "gpu-2");
        assert_eq!(provider.allocated(), vec!["gpu-1", "gpu-2"]);
    }

    #[tokio::test]
    async fn test_scripted_ids_come_first() {
        let provider = MockProvider::with_instance_ids(["gpu-123"]);
        let reqs = Requirements::new();
        assert_eq!(provider.allocate("A100", &reqs).await.unwrap(), "gpu-123");
        assert_eq!(provider.allocate("A100", &reqs).await.unwrap(), "gpu-1");
    }

    #[tokio::test]
    async fn test_allocate_failure_is_transient() {
        let provider = MockProvider::new();
        provider.fail_allocate(true);
        let err = provider
            .allocate("A100", &Requirements::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(provider.allocated().is_empty());
    }

    #[tokio::test]
    async fn test_status_tracks_termination() {
        let provider = MockProvider::new();
        let id = provider.allocate("H100", &Requirements::new()).await.unwrap();
        assert_eq!(provider.status(&id).await.unwrap().status, "running");

        provider.terminate(&id).await.unwrap();
        assert_eq!(provider.status(&id).await.unwrap().status, "stopped");
        assert_eq!(provider.terminated(), vec![id]);
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let provider = MockProvider::new();
        assert!(provider.status("gpu-999").await.unwrap_err().is_not_found());
        assert!(provider.metrics("gpu-999").await.unwrap_err().is_not_found());
    }
}
