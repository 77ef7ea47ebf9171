//! Per-request status bus.
//!
//! Every search request owns one bus. The dispatcher registers one
//! channel for the overall request plus one per discovered candidate,
//! publishes immutable [`StatusEvent`]s, and listeners subscribe at any
//! point in the request's life: a late subscriber first receives a replay
//! of everything already published, then live events.
//!
//! Subscriptions terminate themselves once the request-terminal event
//! has been delivered, so an undrained subscriber never leaks a task.
//! The registration list is guarded by a single exclusion lock held only
//! for list mutation; delivery uses unbounded sends and never blocks
//! under the lock.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use pipesearch_core::types::StatusEvent;

/// One registered broadcast channel.
#[derive(Debug, Clone)]
struct ChannelEntry {
    /// `None` for the overall-request channel.
    solution_id: Option<String>,
}

#[derive(Debug, Default)]
struct BusInner {
    channels: Vec<ChannelEntry>,
    history: Vec<StatusEvent>,
    subscribers: Vec<mpsc::UnboundedSender<StatusEvent>>,
    /// Set once the request-terminal event has been published; no
    /// further events are accepted and new subscribers only get replay.
    closed: bool,
}

/// Status broadcast hub for one search request.
#[derive(Debug)]
pub struct StatusBus {
    request_id: Uuid,
    inner: Mutex<BusInner>,
}

impl StatusBus {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            inner: Mutex::new(BusInner::default()),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Register a broadcast channel; `None` is the overall-request
    /// channel, `Some` a per-candidate channel.
    pub fn register_channel(&self, solution_id: Option<&str>) {
        let mut inner = self.inner.lock();
        inner.channels.push(ChannelEntry {
            solution_id: solution_id.map(str::to_string),
        });
    }

    /// Number of registered channels, the overall channel included.
    pub fn channel_count(&self) -> usize {
        self.inner.lock().channels.len()
    }

    /// Candidate ids with a registered channel, in discovery order.
    pub fn solution_channels(&self) -> Vec<String> {
        self.inner
            .lock()
            .channels
            .iter()
            .filter_map(|c| c.solution_id.clone())
            .collect()
    }

    /// Publish an event to every subscriber and record it for replay.
    ///
    /// Publishing the request-terminal event closes the bus: subscriber
    /// senders are dropped so every receiver drains its backlog and then
    /// ends, making the terminal event the last one observed.
    pub fn publish(&self, event: StatusEvent) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        let terminal = event.is_request_terminal();
        inner.history.push(event.clone());
        inner.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if terminal {
            inner.closed = true;
            inner.subscribers.clear();
        }
    }

    /// Attach a listener.
    ///
    /// Replays the full event history for every already-registered
    /// channel, then delivers live events, all under the same exclusion
    /// lock that shields channel registration, so no event can slip
    /// between replay and registration.
    pub fn subscribe(&self) -> StatusSubscription {
        let mut inner = self.inner.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        for event in &inner.history {
            // Unbounded send to a receiver we still own cannot fail.
            let _ = tx.send(event.clone());
        }
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        StatusSubscription { rx, finished: false }
    }
}

/// A terminating subscription to a request's status events.
#[derive(Debug)]
pub struct StatusSubscription {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
    finished: bool,
}

impl StatusSubscription {
    /// Receive the next event.
    ///
    /// Returns `None` once the request-terminal event has been delivered
    /// (or the bus was dropped); callers can loop on this without any
    /// shutdown bookkeeping of their own.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await?;
        if event.is_request_terminal() {
            self.finished = true;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesearch_core::types::{RequestState, SolutionState};

    #[tokio::test]
    async fn test_replay_then_live_delivery() {
        let request_id = Uuid::new_v4();
        let bus = StatusBus::new(request_id);
        bus.register_channel(None);
        bus.publish(StatusEvent::request(request_id, RequestState::Running));

        bus.register_channel(Some("s-1"));
        bus.publish(StatusEvent::solution(request_id, "s-1", SolutionState::Pending));

        // Late subscriber sees both replayed events.
        let mut sub = bus.subscribe();
        bus.publish(StatusEvent::request(request_id, RequestState::Completed));

        let mut states = Vec::new();
        while let Some(ev) = sub.recv().await {
            states.push(ev.state.to_string());
        }
        assert_eq!(
            states,
            vec!["REQUEST_RUNNING", "SOLUTION_PENDING", "REQUEST_COMPLETED"]
        );
    }

    #[tokio::test]
    async fn test_subscription_terminates_after_terminal_event() {
        let request_id = Uuid::new_v4();
        let bus = StatusBus::new(request_id);
        let mut sub = bus.subscribe();

        bus.publish(StatusEvent::request(request_id, RequestState::Errored));
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
        // Repeated polls stay terminated.
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_nothing_published_after_close() {
        let request_id = Uuid::new_v4();
        let bus = StatusBus::new(request_id);
        let mut sub = bus.subscribe();

        bus.publish(StatusEvent::request(request_id, RequestState::Completed));
        bus.publish(StatusEvent::solution(request_id, "s-1", SolutionState::Completed));

        let last = sub.recv().await.unwrap();
        assert!(last.is_request_terminal());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_channel_registration_counts() {
        let bus = StatusBus::new(Uuid::new_v4());
        bus.register_channel(None);
        bus.register_channel(Some("s-1"));
        bus.register_channel(Some("s-2"));
        assert_eq!(bus.channel_count(), 3);
        assert_eq!(bus.solution_channels(), vec!["s-1", "s-2"]);
    }
}
