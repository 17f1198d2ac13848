//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries two families of [`DomainEvent`]s: inbound catalog
//! signals (`catalog.item_synced`, `quality.issue_detected`) that the
//! engine's trigger listener turns into automation triggers, and outbound
//! `automation.run_*` lifecycle events. Share it via `Arc<EventBus>`.

use autopilot_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// Something that happened to a tenant's catalog or to an automation Run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-separated event name, e.g. `"catalog.item_synced"`.
    pub event_type: String,

    pub tenant_id: Option<String>,

    /// Catalog entity the event is about.
    pub entity_id: Option<String>,

    /// Set on run lifecycle events.
    pub run_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl DomainEvent {
    /// Create an event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id: None,
            entity_id: None,
            run_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the tenant and entity the event concerns.
    pub fn with_entity(mut self, tenant_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_run(mut self, run_id: DbId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use autopilot_events::bus::{DomainEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DomainEvent::new("catalog.item_synced").with_entity("t1", "sku-1"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is subscribed.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            DomainEvent::new("catalog.item_synced")
                .with_entity("t1", "sku-1")
                .with_payload(serde_json::json!({"digest": "abc"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "catalog.item_synced");
        assert_eq!(received.tenant_id.as_deref(), Some("t1"));
        assert_eq!(received.entity_id.as_deref(), Some("sku-1"));
        assert_eq!(received.payload["digest"], "abc");
        assert!(received.run_id.is_none());
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(DomainEvent::new("automation.run_queued").with_run(3));

        assert_eq!(rx1.recv().await.unwrap().run_id, Some(3));
        assert_eq!(rx2.recv().await.unwrap().run_id, Some(3));
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(4);
        bus.publish(DomainEvent::new("orphan.event"));
    }
}
