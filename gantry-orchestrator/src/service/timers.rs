//! Timer registry
//!
//! Maps each job id to at most one cancellable scheduled task. Every armed
//! timer gets a sequence number; a firing timer must [`claim`] its entry
//! before acting, so a timer that was replaced or cancelled while already
//! running finds nothing to claim and backs off.
//!
//! [`claim`]: TimerRegistry::claim

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct TimerEntry {
    seq: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
pub struct TimerRegistry {
    entries: Mutex<HashMap<Uuid, TimerEntry>>,
    next_seq: AtomicU64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, TimerEntry>> {
        // A panic while holding the lock leaves the map itself consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arms a timer for `job_id`, replacing and aborting any existing one
    ///
    /// `spawn` receives the new timer's sequence number and returns its task.
    /// It runs under the registry lock, so two concurrent arms for the same
    /// job cannot both register.
    pub fn arm<F>(&self, job_id: Uuid, spawn: F) -> u64
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries();

        if let Some(previous) = entries.remove(&job_id) {
            previous.handle.abort();
            debug!("Replaced timer #{} of job {}", previous.seq, job_id);
        }

        let handle = spawn(seq).abort_handle();
        entries.insert(job_id, TimerEntry { seq, handle });
        debug!("Armed timer #{} for job {}", seq, job_id);
        seq
    }

    /// Cancels the job's timer, if any
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.entries().remove(&job_id) {
            Some(entry) => {
                entry.handle.abort();
                debug!("Cancelled timer #{} of job {}", entry.seq, job_id);
                true
            }
            None => false,
        }
    }

    /// Removes the job's entry if it still belongs to timer `seq`
    ///
    /// Called by a firing timer. The task is not aborted: it is the caller.
    pub fn claim(&self, job_id: Uuid, seq: u64) -> bool {
        let mut entries = self.entries();
        match entries.get(&job_id) {
            Some(entry) if entry.seq == seq => {
                entries.remove(&job_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, job_id: Uuid) -> bool {
        self.entries().contains_key(&job_id)
    }

    /// Number of jobs with an armed timer
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts every timer
    pub fn clear(&self) {
        for (_, entry) in self.entries().drain() {
            entry.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn sleeper(fired: Arc<AtomicUsize>, delay: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fired.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_rearm_replaces_existing_timer() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let job_id = Uuid::new_v4();

        let first = registry.arm(job_id, |_| sleeper(fired.clone(), Duration::from_millis(30)));
        let second = registry.arm(job_id, |_| sleeper(fired.clone(), Duration::from_millis(30)));
        assert!(second > first);
        assert_eq!(registry.len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let job_id = Uuid::new_v4();

        registry.arm(job_id, |_| sleeper(fired.clone(), Duration::from_millis(20)));
        assert!(registry.cancel(job_id));
        assert!(!registry.cancel(job_id));
        assert!(!registry.is_armed(job_id));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_timer_cannot_claim() {
        let registry = TimerRegistry::new();
        let job_id = Uuid::new_v4();
        let fired = Arc::new(AtomicUsize::new(0));

        let stale = registry.arm(job_id, |_| sleeper(fired.clone(), Duration::from_secs(60)));
        let current = registry.arm(job_id, |_| sleeper(fired.clone(), Duration::from_secs(60)));

        assert!(!registry.claim(job_id, stale));
        assert!(registry.is_armed(job_id));
        assert!(registry.claim(job_id, current));
        assert!(registry.is_empty());
        assert!(!registry.claim(job_id, current));
    }

    #[tokio::test]
    async fn test_clear_aborts_everything() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            registry.arm(Uuid::new_v4(), |_| {
                sleeper(fired.clone(), Duration::from_millis(20))
            });
        }
        assert_eq!(registry.len(), 3);

        registry.clear();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
