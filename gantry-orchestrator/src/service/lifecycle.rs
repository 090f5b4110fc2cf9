//! Lifecycle Orchestrator
//!
//! Drives every job through `Pending -> Provisioning -> Running ->
//! Completed | Failed`, with `Stopped` reachable from the two active states.
//!
//! The store is authoritative. Each step reads the persisted record, decides
//! the next state and writes it with a compare-and-set, so a stop request and
//! a timer racing on the same job cannot both win. Work on one job is further
//! serialized through a per-job async lock; different jobs never wait on each
//! other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use gantry_core::domain::event::LifecycleEvent;
use gantry_core::domain::instance::{GpuAvailability, GpuMetrics, GpuPricing, InstanceStatus};
use gantry_core::domain::job::{Job, JobState, RunOutcome};
use gantry_core::dto::job::{JobView, SubmitJob};
use gantry_provider::{ProviderError, ProvisioningProvider};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AllocationFailurePolicy, LifecycleConfig};
use crate::error::{OrchestratorError, Result};
use crate::events::{EventBus, Subscription};
use crate::repository::{JobStore, StateChange, TransitionOutcome};
use crate::service::progression::{ProgressionDriver, TimedProgression};
use crate::service::timers::TimerRegistry;

type JobLock = Arc<tokio::sync::Mutex<()>>;

/// Held while one job's state is being read and written
///
/// The map entry lives only as long as someone holds or waits for the lock.
/// Entries are cloned under the map lock, so a strong count of one on drop
/// means nobody else can reach it.
struct JobPermit<'a> {
    locks: &'a Mutex<HashMap<Uuid, JobLock>>,
    job_id: Uuid,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for JobPermit<'_> {
    fn drop(&mut self) {
        // Release first so the guard's reference is not counted below
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.job_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.job_id);
        }
    }
}

pub struct LifecycleOrchestrator {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn ProvisioningProvider>,
    events: EventBus,
    driver: Arc<dyn ProgressionDriver>,
    config: LifecycleConfig,
    timers: TimerRegistry,
    locks: Mutex<HashMap<Uuid, JobLock>>,
}

impl LifecycleOrchestrator {
    /// Orchestrator with fixed-delay progression taken from `config`
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn ProvisioningProvider>,
        events: EventBus,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        let driver = Arc::new(TimedProgression::new(&config));
        Self::with_driver(store, provider, events, config, driver)
    }

    pub fn with_driver(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn ProvisioningProvider>,
        events: EventBus,
        config: LifecycleConfig,
        driver: Arc<dyn ProgressionDriver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            provider,
            events,
            driver,
            config,
            timers: TimerRegistry::new(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    // =========================================================================
    // Submission and stop
    // =========================================================================

    /// Persist a new job, allocate an instance for it and start its timer
    ///
    /// The job is written as `Pending` before the provider is called. If the
    /// allocation fails the error is returned and the job is left `Pending`
    /// or moved to `Failed`, depending on the allocation failure policy. It
    /// never reaches `Provisioning` without an instance id.
    pub async fn submit(self: &Arc<Self>, req: SubmitJob) -> Result<Job> {
        if req.model_type.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "model_type cannot be empty".to_string(),
            ));
        }
        if req.resource_type.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "resource_type cannot be empty".to_string(),
            ));
        }

        let job = Job::new(req);
        self.store.insert(&job).await?;
        info!(
            "Job created: {} ({} on {}) for {}",
            job.id, job.model_type, job.resource.resource_type, job.owner
        );
        self.events.publish(LifecycleEvent::from_job(&job));

        let _permit = self.lock_job(job.id).await;

        let instance_id = match self
            .provider
            .allocate(&job.resource.resource_type, &job.resource.requirements)
            .await
        {
            Ok(instance_id) => instance_id,
            Err(source) => {
                self.on_allocation_failure(&job, &source).await;
                return Err(OrchestratorError::Provisioning {
                    job_id: job.id,
                    source,
                });
            }
        };

        let change = StateChange {
            job_id: job.id,
            from: JobState::Pending,
            to: JobState::Provisioning,
            instance_id: Some(instance_id.clone()),
            note: format!("provisioning on instance {}", instance_id),
        };

        let outcome = match self.store.transition(change).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release_instance(job.id, &instance_id).await;
                return Err(e.into());
            }
        };

        match outcome {
            TransitionOutcome::Applied(updated) => {
                info!(
                    "Job {} provisioning on instance {}",
                    updated.id, instance_id
                );
                self.events.publish(LifecycleEvent::from_job(&updated));
                if let Some(delay) = self.driver.delay_for(updated.state) {
                    self.arm_timer(updated.id, delay);
                }
                Ok(updated)
            }
            TransitionOutcome::Conflict(state) => {
                self.release_instance(job.id, &instance_id).await;
                Err(OrchestratorError::Conflict {
                    job_id: job.id,
                    state,
                    expected: JobState::Pending,
                })
            }
            TransitionOutcome::Missing => {
                self.release_instance(job.id, &instance_id).await;
                Err(OrchestratorError::NotFound(job.id))
            }
        }
    }

    async fn on_allocation_failure(&self, job: &Job, err: &ProviderError) {
        warn!("Allocation failed for job {}: {}", job.id, err);
        let note = format!("allocation failed: {}", err);

        match self.config.allocation_failure_policy {
            AllocationFailurePolicy::LeavePending => {
                if let Err(e) = self.store.append_audit(job.id, &note).await {
                    warn!("Could not record allocation failure of job {}: {}", job.id, e);
                }
            }
            AllocationFailurePolicy::MarkFailed => {
                let change = StateChange {
                    job_id: job.id,
                    from: JobState::Pending,
                    to: JobState::Failed,
                    instance_id: None,
                    note,
                };
                match self.store.transition(change).await {
                    Ok(TransitionOutcome::Applied(failed)) => {
                        self.events.publish(LifecycleEvent::from_job(&failed));
                    }
                    Ok(other) => {
                        warn!("Job {} not marked failed: {:?}", job.id, other);
                    }
                    Err(e) => {
                        warn!("Could not mark job {} failed: {}", job.id, e);
                    }
                }
            }
        }
    }

    /// Stop a job that is `Provisioning` or `Running`
    ///
    /// # Returns
    /// `true` if this call moved the job to `Stopped`; `false` if the job is
    /// unknown or not in a stoppable state. Calling it twice yields `true` at
    /// most once.
    pub async fn request_stop(self: &Arc<Self>, job_id: Uuid) -> Result<bool> {
        let permit = self.lock_job(job_id).await;

        let Some(mut job) = self.store.get(job_id).await? else {
            debug!("Stop requested for unknown job {}", job_id);
            return Ok(false);
        };

        let stopped = loop {
            if !job.state.is_stoppable() {
                debug!("Job {} is {} and cannot be stopped", job_id, job.state);
                return Ok(false);
            }

            let change = StateChange {
                job_id,
                from: job.state,
                to: JobState::Stopped,
                instance_id: None,
                note: format!("stopped on request while {}", job.state),
            };

            match self.store.transition(change).await? {
                TransitionOutcome::Applied(updated) => break updated,
                // Another process moved the job; retry from what the store holds
                TransitionOutcome::Conflict(current) => job.state = current,
                TransitionOutcome::Missing => return Ok(false),
            }
        };

        self.timers.cancel(job_id);
        info!("Job {} stopped", job_id);
        self.events.publish(LifecycleEvent::from_job(&stopped));
        drop(permit);

        if let Some(instance_id) = &stopped.provider_instance_id {
            self.release_instance(job_id, instance_id).await;
        }

        Ok(true)
    }

    /// Best-effort terminate; failures are only logged
    async fn release_instance(&self, job_id: Uuid, instance_id: &str) {
        match self.provider.terminate(instance_id).await {
            Ok(()) => debug!("Terminated instance {} of job {}", instance_id, job_id),
            Err(e) => warn!(
                "Failed to terminate instance {} of job {}: {}",
                instance_id, job_id, e
            ),
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Arm the job's timer, replacing any existing one
    ///
    /// The scheduled task only holds a weak reference, so dropping the
    /// orchestrator lets pending timers die out.
    pub fn arm_timer(self: &Arc<Self>, job_id: Uuid, delay: Duration) -> u64 {
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        self.timers.arm(job_id, move |seq| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(orchestrator) = orchestrator.upgrade() {
                    orchestrator.on_timer_fire(job_id, seq).await;
                }
            })
        })
    }

    /// Re-arm the stage timer of a job read back from the store
    ///
    /// `extra` is added to the stage delay. Returns `None` for states without
    /// a timed transition.
    pub fn resume_timer(self: &Arc<Self>, job: &Job, extra: Duration) -> Option<u64> {
        let delay = self.driver.delay_for(job.state)?;
        Some(self.arm_timer(job.id, delay + extra))
    }

    /// Apply the timed transition of a job
    ///
    /// Never fails: every error is logged and leaves the job in its last
    /// durable state. A failed store access re-arms the same stage after
    /// the store retry delay.
    pub async fn on_timer_fire(self: &Arc<Self>, job_id: Uuid, seq: u64) {
        let _permit = self.lock_job(job_id).await;

        if !self.timers.claim(job_id, seq) {
            debug!("Discarding stale timer #{} of job {}", seq, job_id);
            return;
        }

        let job = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Timer fired for missing job {}, dropping it", job_id);
                return;
            }
            Err(e) => {
                error!("Failed to load job {} on timer: {}", job_id, e);
                self.arm_timer(job_id, self.config.store_retry_delay);
                return;
            }
        };

        if job.is_terminal() {
            debug!("Job {} already {}, timer is a no-op", job_id, job.state);
            return;
        }

        let outcome = match job.state {
            JobState::Running => self.driver.settle(&job),
            _ => RunOutcome::Succeeded,
        };

        let target = match job.state.tick_target(outcome) {
            Ok(target) => target,
            Err(e) => {
                warn!("Discarding timer of job {}: {}", job_id, e);
                let note = format!("discarded timer: {}", e);
                if let Err(e) = self.store.append_audit(job_id, &note).await {
                    warn!("Could not record discarded timer of job {}: {}", job_id, e);
                }
                return;
            }
        };

        let change = StateChange {
            job_id,
            from: job.state,
            to: target,
            instance_id: None,
            note: format!("{} -> {} on timer", job.state, target),
        };

        match self.store.transition(change).await {
            Ok(TransitionOutcome::Applied(updated)) => {
                info!("Job {} is now {}", job_id, updated.state);
                self.events.publish(LifecycleEvent::from_job(&updated));

                if let Some(delay) = self.driver.delay_for(updated.state) {
                    self.arm_timer(job_id, delay);
                }
            }
            Ok(TransitionOutcome::Conflict(current)) => {
                warn!(
                    "Job {} moved to {} before its timer applied {}",
                    job_id, current, target
                );
                let note = format!(
                    "discarded timer: job moved to {} before {}",
                    current, target
                );
                if let Err(e) = self.store.append_audit(job_id, &note).await {
                    warn!("Could not record discarded timer of job {}: {}", job_id, e);
                }
            }
            Ok(TransitionOutcome::Missing) => {
                warn!("Job {} vanished before its timer applied {}", job_id, target);
            }
            Err(e) => {
                error!(
                    "Failed to persist {} -> {} for job {}: {}",
                    job.state, target, job_id, e
                );
                self.arm_timer(job_id, self.config.store_retry_delay);
            }
        }
    }

    /// Number of jobs with an armed timer
    pub fn active_timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn has_active_timer(&self, job_id: Uuid) -> bool {
        self.timers.is_armed(job_id)
    }

    /// Cancel every timer; persisted state is untouched
    pub fn shutdown(&self) {
        let armed = self.timers.len();
        self.timers.clear();
        info!("Cancelled {} armed timer(s)", armed);
    }

    /// Serialize work on one job until the returned permit is dropped
    async fn lock_job(&self, job_id: Uuid) -> JobPermit<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(job_id).or_default().clone()
        };
        // Built before waiting so a cancelled wait still cleans up the entry
        let mut permit = JobPermit {
            locks: &self.locks,
            job_id,
            guard: None,
        };
        permit.guard = Some(lock.lock_owned().await);
        permit
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or(OrchestratorError::NotFound(job_id))
    }

    /// Persisted job plus a live instance snapshot
    ///
    /// A failing `status` call yields an `"unknown"` snapshot instead of an
    /// error.
    pub async fn describe(&self, job_id: Uuid) -> Result<JobView> {
        let job = self.get_job(job_id).await?;

        let instance = match &job.provider_instance_id {
            Some(instance_id) => Some(match self.provider.status(instance_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Status of instance {} unavailable: {}", instance_id, e);
                    InstanceStatus::unknown(instance_id.clone())
                }
            }),
            None => None,
        };

        Ok(JobView { job, instance })
    }

    /// Live GPU metrics of the job's instance
    pub async fn instance_metrics(&self, job_id: Uuid) -> Result<GpuMetrics> {
        let job = self.get_job(job_id).await?;
        let instance_id = job.provider_instance_id.ok_or_else(|| {
            OrchestratorError::InvalidRequest(format!("job {} has no instance", job_id))
        })?;
        Ok(self.provider.metrics(&instance_id).await?)
    }

    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<Job>> {
        Ok(self.store.list_for_owner(owner).await?)
    }

    pub async fn available_gpus(&self) -> Result<Vec<GpuAvailability>> {
        Ok(self.provider.list_available().await?)
    }

    pub async fn pricing(&self) -> Result<Vec<GpuPricing>> {
        Ok(self.provider.pricing().await?)
    }

    pub fn subscribe(&self, job_id: Option<Uuid>) -> Subscription {
        self.events.subscribe(job_id)
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }
}
