//! Host event bus.
//!
//! The broker reports every transition to the host through this trait, so
//! the broker core can be tested without a shell attached.

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Trait for emitting broker events to the host.
pub trait EventBus: Send + Sync {
    /// Emit an event with a JSON payload on `topic`
    /// (see [`crate::event_names`]).
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

/// Type alias for shared event bus reference.
pub type EventBusRef = Arc<dyn EventBus>;

impl dyn EventBus {
    /// Serialize a DTO and emit it. Serialization failures are logged and
    /// the event is dropped.
    pub fn emit_dto<T: Serialize>(&self, topic: &str, dto: &T) {
        match serde_json::to_value(dto) {
            Ok(payload) => self.emit(topic, payload),
            Err(err) => tracing::warn!(topic, %err, "Failed to serialize event payload"),
        }
    }
}

/// Event bus that records everything, for tests and diagnostics.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<EmittedEvent>>,
}

/// A captured event from [`InMemoryEventBus`].
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EmittedEvent> {
        self.lock().clone()
    }

    /// Payloads emitted on one topic, in emission order.
    pub fn payloads_for(&self, topic: &str) -> Vec<serde_json::Value> {
        self.lock()
            .iter()
            .filter(|e| e.topic == topic)
            .map(|e| e.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EmittedEvent>> {
        // A panicking test thread must not hide the events recorded so far.
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.lock().push(EmittedEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Event bus that discards everything.
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn emit(&self, _topic: &str, _payload: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_event_bus() {
        let bus = InMemoryEventBus::new();

        bus.emit("channels:a", json!({"n": 1}));
        bus.emit("channels:b", json!({"n": 2}));
        bus.emit("channels:a", json!({"n": 3}));

        assert_eq!(bus.len(), 3);
        assert_eq!(
            bus.payloads_for("channels:a"),
            vec![json!({"n": 1}), json!({"n": 3})]
        );
        assert!(bus.payloads_for("channels:missing").is_empty());
    }

    #[test]
    fn test_emit_dto() {
        #[derive(Serialize)]
        struct Dto {
            value: u32,
        }

        let bus = Arc::new(InMemoryEventBus::new());
        let dyn_bus: EventBusRef = bus.clone();
        dyn_bus.emit_dto("topic", &Dto { value: 7 });

        assert_eq!(bus.payloads_for("topic"), vec![json!({"value": 7})]);
        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn test_null_event_bus() {
        NullEventBus.emit("topic", json!({"data": "ignored"}));
    }
}
