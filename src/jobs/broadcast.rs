//! Per-job progress broadcast.
//!
//! Fan-out with a single serialization per event. A failed send drops
//! the subscriber. The last event per job is retained and replayed on
//! subscribe so clients that connect after a terminal event still
//! learn the outcome.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::models::WsEvent;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, Vec<Subscriber>>,
    last_event: HashMap<String, String>,
    next_id: u64,
}

/// Subscriber registry for all jobs, guarded by its own lock.
#[derive(Default)]
pub struct ConnectionManager {
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for a job. The job's last event, if any,
    /// is replayed into the channel before any new event arrives.
    pub fn subscribe(&self, job_id: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;

        if let Some(last) = inner.last_event.get(job_id) {
            // Receiver is fresh, the send cannot fail here
            let _ = tx.send(last.clone());
        }

        inner
            .subscribers
            .entry(job_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        debug!(job_id, subscriber = id, "subscriber attached");
        (id, rx)
    }

    pub fn unsubscribe(&self, job_id: &str, subscriber_id: u64) {
        let mut inner = self.inner.lock();
        if let Some(subscribers) = inner.subscribers.get_mut(job_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                inner.subscribers.remove(job_id);
            }
        }
        debug!(job_id, subscriber = subscriber_id, "subscriber detached");
    }

    /// Serialize once and fan out. Subscribers whose channel is gone
    /// are removed.
    pub fn broadcast(&self, job_id: &str, event: &WsEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, job_id, "failed to serialize progress event");
                return;
            }
        };

        let mut inner = self.inner.lock();
        inner.last_event.insert(job_id.to_string(), payload.clone());

        if let Some(subscribers) = inner.subscribers.get_mut(job_id) {
            subscribers.retain(|s| s.tx.send(payload.clone()).is_ok());
            if subscribers.is_empty() {
                inner.subscribers.remove(job_id);
            }
        }
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(job_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(status: &str) -> WsEvent {
        WsEvent::Status {
            status: status.to_string(),
            message: None,
            error: None,
            job_id: None,
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_all_subscribers() {
        let manager = ConnectionManager::new();
        let (_id_a, mut rx_a) = manager.subscribe("job");
        let (_id_b, mut rx_b) = manager.subscribe("job");

        manager.broadcast("job", &status_event("processing"));

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains("processing"));
    }

    #[tokio::test]
    async fn late_subscriber_replays_last_event() {
        let manager = ConnectionManager::new();
        manager.broadcast("job", &status_event("processing"));
        manager.broadcast("job", &status_event("completed"));

        // Subscribes after the terminal event and still sees it
        let (_id, mut rx) = manager.subscribe("job");
        let replayed = rx.recv().await.unwrap();
        assert!(replayed.contains("completed"));
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_broadcast() {
        let manager = ConnectionManager::new();
        let (_id_a, rx_a) = manager.subscribe("job");
        let (_id_b, mut rx_b) = manager.subscribe("job");
        assert_eq!(manager.subscriber_count("job"), 2);

        drop(rx_a);
        manager.broadcast("job", &status_event("processing"));
        assert_eq!(manager.subscriber_count("job"), 1);
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_subscriber() {
        let manager = ConnectionManager::new();
        let (id_a, _rx_a) = manager.subscribe("job");
        let (_id_b, _rx_b) = manager.subscribe("job");

        manager.unsubscribe("job", id_a);
        assert_eq!(manager.subscriber_count("job"), 1);

        manager.unsubscribe("other", 999);
        assert_eq!(manager.subscriber_count("job"), 1);
    }

    #[tokio::test]
    async fn events_for_other_jobs_are_not_delivered() {
        let manager = ConnectionManager::new();
        let (_id, mut rx) = manager.subscribe("job-a");
        manager.broadcast("job-b", &status_event("completed"));

        manager.broadcast("job-a", &status_event("queued"));
        let got = rx.recv().await.unwrap();
        assert!(got.contains("queued"));
    }
}
