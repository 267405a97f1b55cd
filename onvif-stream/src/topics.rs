//! Provider topic → event kind lookup table.
//!
//! New event types are added here as data; nothing else needs to change.

use onvif_model::EventKind;

/// Separator between the topic namespace and the event type.
pub const NAMESPACE_DELIMITER: char = ':';

/// How to recognize and read one provider event type.
#[derive(Debug)]
pub struct TopicRule {
    /// Event type, i.e. the topic after the namespace prefix
    pub event_type: &'static str,
    /// Domain event kind the type maps to
    pub kind: EventKind,
    /// Data item names holding the boolean state, in priority order
    pub state_keys: &'static [&'static str],
}

pub static TOPIC_TABLE: &[TopicRule] = &[
    TopicRule {
        event_type: "RuleEngine/CellMotionDetector/Motion",
        kind: EventKind::Motion,
        state_keys: &["IsMotion"],
    },
    TopicRule {
        event_type: "RuleEngine/CellMotionDetector/Motion//.",
        kind: EventKind::Motion,
        state_keys: &["IsMotion"],
    },
    TopicRule {
        event_type: "VideoSource/MotionAlarm",
        kind: EventKind::Motion,
        state_keys: &["State"],
    },
];

/// Find the rule for an event type.
pub fn lookup_topic(event_type: &str) -> Option<&'static TopicRule> {
    TOPIC_TABLE.iter().find(|rule| rule.event_type == event_type)
}
