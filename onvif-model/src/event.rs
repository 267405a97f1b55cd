//! Normalized events flowing from the device state machines to the publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::device::DeviceName;

/// Kind of a [`DomainEvent`].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Motion detected or cleared by the device
    Motion,
    /// No mapped event seen within the silence window
    Silence,
    /// The event subscription failed
    Error,
    /// The device was added to the roster
    Subscribed,
    /// The device was removed from the roster
    Unsubscribed,
    /// The device configuration changed
    Updated,
    /// The device became reachable
    Online,
    /// The device became unreachable
    Offline,
    /// Producer and receipt timestamps diverge beyond the threshold
    Desynchronization,
}

impl EventKind {
    /// Topic key used in outbound topics and as the `eventType` placeholder.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Motion => "motion",
            EventKind::Silence => "silence",
            EventKind::Error => "disconnected",
            EventKind::Subscribed => "subscribe",
            EventKind::Unsubscribed => "unsubscribe",
            EventKind::Updated => "update",
            EventKind::Online => "online",
            EventKind::Offline => "offline",
            EventKind::Desynchronization => "desync",
        }
    }

    /// Whether this kind reports a roster lifecycle change.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventKind::Subscribed | EventKind::Unsubscribed | EventKind::Updated
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device event after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Device the event refers to
    pub device: DeviceName,
    /// What happened
    pub kind: EventKind,
    /// Kind-specific value, `Null` when the kind carries none
    pub payload: Value,
    /// Timestamp assigned by the producer
    pub event_time: DateTime<Utc>,
    /// Timestamp assigned when the pipeline received the event
    pub received_at: Option<DateTime<Utc>>,
}

impl DomainEvent {
    pub fn new(
        device: DeviceName,
        kind: EventKind,
        payload: Value,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            device,
            kind,
            payload,
            event_time,
            received_at: None,
        }
    }

    pub fn motion(device: DeviceName, active: bool, event_time: DateTime<Utc>) -> Self {
        Self::new(device, EventKind::Motion, Value::Bool(active), event_time)
    }

    pub fn silence(device: DeviceName) -> Self {
        Self::new(device, EventKind::Silence, Value::Null, Utc::now())
    }

    /// Subscription failure carrying the provider error code.
    pub fn error(device: DeviceName, code: impl Into<String>) -> Self {
        Self::new(device, EventKind::Error, Value::String(code.into()), Utc::now())
    }

    /// Roster lifecycle event (`Subscribed`, `Unsubscribed` or `Updated`).
    pub fn lifecycle(device: DeviceName, kind: EventKind) -> Self {
        debug_assert!(kind.is_lifecycle());
        Self::new(device, kind, Value::Null, Utc::now())
    }

    /// Liveness transition detected at `at`.
    pub fn liveness(device: DeviceName, alive: bool, at: DateTime<Utc>) -> Self {
        let kind = if alive {
            EventKind::Online
        } else {
            EventKind::Offline
        };
        Self::new(device, kind, Value::Bool(alive), at)
    }

    /// Synthetic event flagging clock skew on `original`.
    pub fn desynchronization(original: &DomainEvent, received_at: DateTime<Utc>) -> Self {
        let payload = json!({
            "eventType": original.kind.as_str(),
            "eventTimestamp": original.event_time.timestamp_millis(),
            "receivedTimestamp": received_at.timestamp_millis(),
        });
        Self {
            device: original.device.clone(),
            kind: EventKind::Desynchronization,
            payload,
            event_time: original.event_time,
            received_at: Some(received_at),
        }
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    /// Payload rendered as text for templates, `None` when there is no payload.
    pub fn event_state(&self) -> Option<String> {
        match &self.payload {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Absolute distance between producer and receipt timestamps.
    pub fn clock_skew(&self) -> Option<chrono::Duration> {
        self.received_at
            .map(|received| (received - self.event_time).abs())
    }
}
