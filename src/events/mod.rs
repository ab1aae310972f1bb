//! Event Bus (C5): topic-based pub/sub with per-document ordering and
//! slow-subscriber-drop backpressure (§4.5).
//!
//! Grounded on the teacher's `tokio::sync::broadcast`-free, channel-per-subscriber
//! approach is not present in FetchBox (its messaging layer was Iggy-based and has
//! been removed); this module instead follows the bounded-mpsc-per-subscriber
//! pattern used for worker task dispatch in `worker::mod` (`WorkerConfig::
//! max_inflight_tasks` bounding a channel), applied here to fan-out instead of
//! fan-in: each subscriber owns a bounded `tokio::sync::mpsc::Receiver` and is
//! dropped, not blocked, when it falls behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;
use uuid::Uuid;

/// Bound on each subscriber's inbox. Exceeding it marks the subscriber slow and
/// causes it to be dropped on the next publish, per §4.5's backpressure policy.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("subscription {0} not found")]
    UnknownSubscription(Uuid),
}

pub type Result<T> = std::result::Result<T, EventBusError>;

/// Core topics published by the pipeline (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    DocumentCreated,
    DocumentUpdated,
    DocumentDeleted,
    ProcessingProgress,
    SystemNotification,
}

/// The envelope wrapping every published event (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub topic: Topic,
    pub document_id: Option<String>,
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// What a subscriber wants to hear about: a topic, a specific document's room,
/// or both.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub topics: Option<Vec<Topic>>,
    pub document_id: Option<String>,
}

impl Filter {
    fn matches(&self, event: &Event) -> bool {
        let topic_ok = self
            .topics
            .as_ref()
            .is_none_or(|topics| topics.contains(&event.topic));
        let room_ok = match &self.document_id {
            Some(id) => event.document_id.as_deref() == Some(id.as_str()),
            None => true,
        };
        topic_ok && room_ok
    }
}

struct Subscriber {
    filter: Filter,
    sender: mpsc::Sender<Event>,
}

#[derive(Default)]
struct State {
    subscribers: HashMap<Uuid, Subscriber>,
}

pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Event>,
}

/// In-process pub/sub bus. One instance is shared (via `Arc`) across the
/// Processor, Submission Service, and any subscriber-facing surface.
pub struct EventBus {
    state: Mutex<State>,
    sequences: Mutex<HashMap<String, u64>>,
    global_sequence: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            sequences: Mutex::new(HashMap::new()),
            global_sequence: AtomicU64::new(0),
        }
    }

    pub async fn subscribe(&self, filter: Filter) -> Subscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut state = self.state.lock().await;
        state.subscribers.insert(id, Subscriber { filter, sender });
        Subscription { id, receiver }
    }

    pub async fn unsubscribe(&self, subscription_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .subscribers
            .remove(&subscription_id)
            .map(|_| ())
            .ok_or(EventBusError::UnknownSubscription(subscription_id))
    }

    /// Publishes an event scoped to a document room (also fanned out to global
    /// subscribers of the same topic, per §4.5).
    pub async fn publish(&self, topic: Topic, document_id: &str, payload: serde_json::Value) {
        let sequence = self.next_sequence(document_id).await;
        let event = Event {
            topic,
            document_id: Some(document_id.to_string()),
            sequence,
            emitted_at: Utc::now(),
            payload,
        };
        self.dispatch(event).await;
    }

    /// Publishes an event with no document affinity (e.g. `system:notification`).
    pub async fn broadcast(&self, topic: Topic, payload: serde_json::Value) {
        let sequence = self.global_sequence.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            topic,
            document_id: None,
            sequence,
            emitted_at: Utc::now(),
            payload,
        };
        self.dispatch(event).await;
    }

    async fn next_sequence(&self, document_id: &str) -> u64 {
        let mut sequences = self.sequences.lock().await;
        let counter = sequences.entry(document_id.to_string()).or_insert(0);
        let seq = *counter;
        *counter += 1;
        seq
    }

    async fn dispatch(&self, event: Event) {
        let mut state = self.state.lock().await;
        let mut dead = Vec::new();

        for (id, subscriber) in state.subscribers.iter() {
            if !subscriber.filter.matches(&event) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = %id, "slow subscriber dropped");
                    dead.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            state.subscribers.remove(&id);
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_matching_topic() {
        let bus = EventBus::new();
        let mut sub = bus
            .subscribe(Filter {
                topics: Some(vec![Topic::DocumentCreated]),
                document_id: None,
            })
            .await;

        bus.publish(Topic::DocumentCreated, "doc-1", serde_json::json!({})).await;
        let event = sub.receiver.recv().await.unwrap();
        assert_eq!(event.topic, Topic::DocumentCreated);
        assert_eq!(event.document_id.as_deref(), Some("doc-1"));
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topics() {
        let bus = EventBus::new();
        let mut sub = bus
            .subscribe(Filter {
                topics: Some(vec![Topic::DocumentDeleted]),
                document_id: None,
            })
            .await;

        bus.publish(Topic::DocumentCreated, "doc-1", serde_json::json!({})).await;
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_subscriber_only_hears_its_document() {
        let bus = EventBus::new();
        let mut sub = bus
            .subscribe(Filter {
                topics: None,
                document_id: Some("doc-1".to_string()),
            })
            .await;

        bus.publish(Topic::ProcessingProgress, "doc-2", serde_json::json!({})).await;
        assert!(sub.receiver.try_recv().is_err());

        bus.publish(Topic::ProcessingProgress, "doc-1", serde_json::json!({})).await;
        assert!(sub.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn per_document_sequence_is_monotonic() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(Filter::default()).await;

        bus.publish(Topic::ProcessingProgress, "doc-1", serde_json::json!({"progress": 10})).await;
        bus.publish(Topic::ProcessingProgress, "doc-1", serde_json::json!({"progress": 30})).await;

        let first = sub.receiver.recv().await.unwrap();
        let second = sub.receiver.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_not_stalled() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Filter::default()).await;

        for _ in 0..(SUBSCRIBER_BUFFER + 10) {
            bus.publish(Topic::ProcessingProgress, "doc-1", serde_json::json!({})).await;
        }

        let state = bus.state.lock().await;
        assert!(!state.subscribers.contains_key(&sub.id));
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscriber() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Filter::default()).await;
        bus.unsubscribe(sub.id).await.unwrap();
        assert!(bus.unsubscribe(sub.id).await.is_err());
    }
}
