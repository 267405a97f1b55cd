//! Outbound topic/payload templates.
//!
//! Patterns use `${name}` placeholders. Known names are `deviceId` (alias
//! `onvifDeviceId`), `eventType`, `eventState` and `timestamp` (epoch
//! milliseconds). Unknown placeholders are left in place.

use std::borrow::Cow;

use onvif_model::DomainEvent;
use serde::{Deserialize, Serialize};

/// A user-configured message shape. Applied to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRule {
    /// Topic suffix under `{prefix}/{device}/`
    #[serde(default)]
    pub subtopic: String,
    /// Payload pattern
    #[serde(default)]
    pub template: String,
    #[serde(default = "default_retain")]
    pub retain: bool,
}

fn default_retain() -> bool {
    true
}

impl TemplateRule {
    pub fn new(subtopic: impl Into<String>, template: impl Into<String>, retain: bool) -> Self {
        Self {
            subtopic: subtopic.into(),
            template: template.into(),
            retain,
        }
    }
}

/// Placeholder values for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues<'a> {
    pub device_id: &'a str,
    pub event_type: &'a str,
    pub event_state: Option<String>,
    pub timestamp: i64,
}

impl<'a> TemplateValues<'a> {
    pub fn from_event(event: &'a DomainEvent) -> Self {
        Self {
            device_id: event.device.as_str(),
            event_type: event.kind.as_str(),
            event_state: event.event_state(),
            timestamp: event.event_time.timestamp_millis(),
        }
    }

    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "deviceId" | "onvifDeviceId" => Some(Cow::Borrowed(self.device_id)),
            "eventType" => Some(Cow::Borrowed(self.event_type)),
            "eventState" => Some(Cow::Borrowed(self.event_state.as_deref().unwrap_or(""))),
            "timestamp" => Some(Cow::Owned(self.timestamp.to_string())),
            _ => None,
        }
    }
}

/// Interpolate `values` into `pattern`.
pub fn render_template(pattern: &str, values: &TemplateValues<'_>) -> String {
    let mut rendered = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("${") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the remainder verbatim.
            rendered.push_str(&rest[start..]);
            return rendered;
        };

        let name = &after[..end];
        match values.lookup(name) {
            Some(value) => rendered.push_str(&value),
            None => rendered.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    rendered.push_str(rest);
    rendered
}
