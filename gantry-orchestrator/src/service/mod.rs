//! Service Module
//!
//! Lifecycle logic of the orchestrator. Services sit between the job store,
//! the event bus and the provisioning provider.

pub mod lifecycle;
pub mod progression;
pub mod recovery;
pub mod timers;

// Re-export for convenience
pub use lifecycle::LifecycleOrchestrator;
pub use progression::{OutcomePolicy, ProgressionDriver, TimedProgression};
pub use recovery::{RecoveryManager, RecoveryReport};
pub use timers::TimerRegistry;
