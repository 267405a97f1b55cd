//! Raw provider event → [`DomainEvent`].

use chrono::{DateTime, NaiveDateTime, Utc};
use onvif_model::{DeviceName, DomainEvent, EventKind};
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::source::RawEvent;
use crate::topics::{lookup_topic, NAMESPACE_DELIMITER};

/// Strip the namespace from a provider topic.
///
/// `tns1:VideoSource/MotionAlarm` → `VideoSource/MotionAlarm`. Only the first
/// delimiter splits; the event type itself may contain more.
pub fn split_topic(topic: &str) -> Result<&str, NormalizeError> {
    topic
        .split_once(NAMESPACE_DELIMITER)
        .map(|(_, event_type)| event_type)
        .ok_or_else(|| NormalizeError::MissingDelimiter(topic.to_string()))
}

/// Parse a provider timestamp, assuming UTC when it carries no zone.
///
/// Falls back to the current time when the value is absent or unparseable.
pub fn parse_provider_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Utc::now();
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }

    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => naive.and_utc(),
        Err(e) => {
            tracing::warn!(utc_time = raw, error = %e, "Unparseable event timestamp, using receipt time");
            Utc::now()
        }
    }
}

/// Normalize a raw event from `device`.
///
/// Unmapped event types, events without data items and events whose state
/// item is missing or not a boolean are rejected; the caller logs and drops
/// them.
pub fn normalize(device: &DeviceName, raw: &RawEvent) -> Result<DomainEvent, NormalizeError> {
    let event_type = split_topic(&raw.topic)?;
    let rule = lookup_topic(event_type)
        .ok_or_else(|| NormalizeError::Unmapped(event_type.to_string()))?;

    let values = raw.items.fold();
    if values.is_empty() {
        return Err(NormalizeError::EmptyPayload(event_type.to_string()));
    }

    let timestamp = parse_provider_timestamp(raw.utc_time.as_deref());

    let state = rule
        .state_keys
        .iter()
        .find_map(|key| values.get(*key))
        .and_then(|value| parse_bool(value));

    let event = match (rule.kind, state) {
        (EventKind::Motion, Some(active)) => DomainEvent::motion(device.clone(), active, timestamp),
        (kind, Some(state)) => DomainEvent::new(device.clone(), kind, Value::Bool(state), timestamp),
        (_, None) if !rule.state_keys.is_empty() => {
            return Err(NormalizeError::UnrecognizedState(event_type.to_string()));
        }
        (kind, None) => {
            let payload: Map<String, Value> = values
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            DomainEvent::new(device.clone(), kind, Value::Object(payload), timestamp)
        }
    };

    Ok(event)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "active" => Some(true),
        "false" | "0" | "off" | "inactive" => Some(false),
        _ => None,
    }
}
