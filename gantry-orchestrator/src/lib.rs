//! Gantry orchestrator
//!
//! Job store, event bus, lifecycle orchestration and recovery for GPU jobs.
//! The `gantry` binary in this crate wires them to a provisioning provider.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod repository;
pub mod service;

pub use config::{AllocationFailurePolicy, Config, LifecycleConfig, ProviderKind};
pub use error::{OrchestratorError, Result, StoreError};
pub use events::{EventBus, Subscription};
pub use repository::{InMemoryJobStore, JobStore, PgJobStore};
pub use service::{LifecycleOrchestrator, RecoveryManager, RecoveryReport};
