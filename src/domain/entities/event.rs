use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event type for inbound chat messages
pub const MESSAGE: &str = "message";

/// Event type for interactions (button presses, menus)
pub const INTERACTION: &str = "interaction";

/// An application event; the payload is passed through unchanged
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn message(payload: serde_json::Value) -> Self {
        Self::new(MESSAGE, payload)
    }

    /// Convenience accessor for string payload fields
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Returned by event handlers to control dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

/// An event subscription declared by a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub event_type: String,
    /// Handler key passed back to the plugin on dispatch
    pub handler: String,
    /// Higher is dispatched first
    pub priority: i32,
}

impl SubscriptionSpec {
    pub fn new(event_type: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            handler: handler.into(),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
