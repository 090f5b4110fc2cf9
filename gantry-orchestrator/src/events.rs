//! Event Bus
//!
//! Fan-out of lifecycle events to live subscribers. A subscription is either
//! scoped to one job or unscoped (every job, for dashboards). Delivery is
//! at-most-once: there is no replay, and a subscriber that joins after an
//! event was published never sees it. Events of one job reach a subscriber
//! in publish order.

use gantry_core::domain::event::LifecycleEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Largest per-subscriber buffer a bus will allocate
pub const MAX_EVENT_BUFFER: usize = 1 << 16;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    ///
    /// The capacity is clamped to `1..=MAX_EVENT_BUFFER`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_BUFFER));
        Self { tx }
    }

    /// Publish an event to every current subscriber
    ///
    /// # Returns
    /// The number of subscribers the event was handed to
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        debug!("Publishing {} for job {}", event.status, event.job_id);
        // Err only means nobody is listening
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to one job's events, or to all events with `None`
    pub fn subscribe(&self, job_id: Option<Uuid>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            job_id,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A live event stream
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<LifecycleEvent>,
    job_id: Option<Uuid>,
}

impl Subscription {
    fn matches(&self, event: &LifecycleEvent) -> bool {
        self.job_id.is_none_or(|id| id == event.job_id)
    }

    /// Wait for the next matching event
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, {} event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already buffered
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, {} event(s) dropped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::job::JobState;

    fn event(job_id: Uuid, status: JobState) -> LifecycleEvent {
        LifecycleEvent {
            job_id,
            status,
            instance_id: None,
        }
    }

    #[tokio::test]
    async fn test_scoped_subscription_filters_other_jobs() {
        let bus = EventBus::new(16);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut only_a = bus.subscribe(Some(a));
        let mut all = bus.subscribe(None);

        bus.publish(event(b, JobState::Provisioning));
        bus.publish(event(a, JobState::Provisioning));
        bus.publish(event(a, JobState::Running));

        assert_eq!(only_a.recv().await.unwrap().status, JobState::Provisioning);
        assert_eq!(only_a.recv().await.unwrap().status, JobState::Running);
        assert!(only_a.try_recv().is_none());

        let seen: Vec<Uuid> = std::iter::from_fn(|| all.try_recv())
            .map(|e| e.job_id)
            .collect();
        assert_eq!(seen, vec![b, a, a]);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(16);
        let id = Uuid::new_v4();
        assert_eq!(bus.publish(event(id, JobState::Provisioning)), 0);

        let mut late = bus.subscribe(None);
        assert!(late.try_recv().is_none());

        assert_eq!(bus.publish(event(id, JobState::Running)), 1);
        assert_eq!(late.recv().await.unwrap().status, JobState::Running);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_newest_events() {
        let bus = EventBus::new(2);
        let id = Uuid::new_v4();
        let mut sub = bus.subscribe(Some(id));

        bus.publish(event(id, JobState::Pending));
        bus.publish(event(id, JobState::Provisioning));
        bus.publish(event(id, JobState::Running));

        assert_eq!(sub.recv().await.unwrap().status, JobState::Provisioning);
        assert_eq!(sub.recv().await.unwrap().status, JobState::Running);
    }

    #[tokio::test]
    async fn test_out_of_range_capacity_is_clamped() {
        let id = Uuid::new_v4();
        for capacity in [0, usize::MAX] {
            let bus = EventBus::new(capacity);
            let mut sub = bus.subscribe(Some(id));
            assert_eq!(bus.publish(event(id, JobState::Running)), 1);
            assert_eq!(sub.recv().await.unwrap().status, JobState::Running);
        }
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe(None);
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
