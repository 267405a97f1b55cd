//! Domain events → rendered bus messages.

use std::sync::Arc;

use chrono::Utc;
use onvif_model::{DomainEvent, EventKind};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::sink::{OutboundMessage, PublishSink};
use crate::template::{render_template, TemplateValues};

/// Renders every event through the configured templates and hands the
/// messages to the publish sink.
///
/// Events are processed one at a time in arrival order, so messages of one
/// device keep the order in which its events were produced. A failed publish
/// is logged and the next message is sent regardless.
pub struct NotificationPipeline {
    config: PipelineConfig,
    sink: Arc<dyn PublishSink>,
}

impl NotificationPipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn PublishSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Publish everything `event` produces. Returns the number of messages
    /// the sink accepted.
    ///
    /// When the event's producer timestamp is further than the desync
    /// threshold from its receipt time, a Desynchronization event is
    /// published first.
    pub async fn process(&self, event: DomainEvent) -> usize {
        let received_at = event.received_at.unwrap_or_else(Utc::now);
        let event = event.with_received_at(received_at);

        let mut published = 0;
        if self.is_desynchronized(&event) {
            tracing::warn!(
                device = %event.device,
                event_type = %event.kind,
                event_time = %event.event_time,
                received_at = %received_at,
                "Event timestamp out of sync with receipt time"
            );
            let desync = DomainEvent::desynchronization(&event, received_at);
            published += self.publish_all(self.render(&desync)).await;
        }

        published += self.publish_all(self.render(&event)).await;
        published
    }

    /// Messages for `event`: one per template rule, then the default topic.
    pub fn render(&self, event: &DomainEvent) -> Vec<OutboundMessage> {
        let values = TemplateValues::from_event(event);
        let base = format!("{}/{}", self.config.topic_prefix, event.device);

        let mut messages: Vec<OutboundMessage> = self
            .config
            .templates
            .iter()
            .map(|rule| {
                OutboundMessage::new(
                    format!("{base}/{}", render_template(&rule.subtopic, &values)),
                    render_template(&rule.template, &values),
                    rule.retain,
                )
            })
            .collect();

        if self.config.default_topics {
            messages.push(OutboundMessage::new(
                format!("{base}/{}", default_topic_key(event.kind)),
                default_payload(event),
                true,
            ));
        }

        messages
    }

    /// Consume events until every sender is gone.
    pub fn spawn(self, mut events: mpsc::Receiver<DomainEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Notification pipeline started");
            while let Some(event) = events.recv().await {
                tracing::trace!(device = %event.device, kind = %event.kind, "Processing event");
                self.process(event).await;
            }
            tracing::info!("Notification pipeline stopped");
        })
    }

    fn is_desynchronized(&self, event: &DomainEvent) -> bool {
        event
            .clock_skew()
            .and_then(|skew| skew.to_std().ok())
            .is_some_and(|skew| skew > self.config.desync_threshold)
    }

    async fn publish_all(&self, messages: Vec<OutboundMessage>) -> usize {
        let mut published = 0;
        for message in &messages {
            match self.sink.publish(message).await {
                Ok(()) => published += 1,
                Err(e) => {
                    tracing::error!(topic = %message.topic, "Failed to publish: {}", e);
                }
            }
        }
        published
    }
}

/// Online and Offline share one state topic.
fn default_topic_key(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Online | EventKind::Offline => EventKind::Online.as_str(),
        other => other.as_str(),
    }
}

fn default_payload(event: &DomainEvent) -> String {
    match (event.kind, &event.payload) {
        (EventKind::Motion | EventKind::Online | EventKind::Offline, Value::Bool(state)) => {
            sensor_state(*state).to_string()
        }
        (EventKind::Online, _) => sensor_state(true).to_string(),
        (EventKind::Offline, _) => sensor_state(false).to_string(),
        _ => event.event_state().unwrap_or_default(),
    }
}

fn sensor_state(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRule;
    use chrono::TimeZone;
    use onvif_model::DeviceName;

    fn pipeline(config: PipelineConfig) -> NotificationPipeline {
        NotificationPipeline::new(config, Arc::new(crate::sink::LogSink)).unwrap()
    }

    #[test]
    fn test_default_topics() {
        let pipeline = pipeline(PipelineConfig::default());
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let porch = DeviceName::new("porch");

        let messages = pipeline.render(&DomainEvent::motion(porch.clone(), true, at));
        assert_eq!(messages, vec![OutboundMessage::new("onvif2mqtt/porch/motion", "ON", true)]);

        let messages = pipeline.render(&DomainEvent::liveness(porch.clone(), false, at));
        assert_eq!(messages, vec![OutboundMessage::new("onvif2mqtt/porch/online", "OFF", true)]);

        let messages = pipeline.render(&DomainEvent::error(porch.clone(), "ENETWORK"));
        assert_eq!(messages[0].topic, "onvif2mqtt/porch/disconnected");
        assert_eq!(messages[0].payload, "ENETWORK");

        let messages = pipeline.render(&DomainEvent::lifecycle(porch, EventKind::Unsubscribed));
        assert_eq!(messages[0].topic, "onvif2mqtt/porch/unsubscribe");
        assert_eq!(messages[0].payload, "");
    }

    #[test]
    fn test_templates_render_before_default_topic() {
        let pipeline = pipeline(
            PipelineConfig::default()
                .with_topic_prefix("cams")
                .with_templates(vec![
                    TemplateRule::new("events/${eventType}", r#"{"on": ${eventState}}"#, false),
                    TemplateRule::new("last", "${timestamp}", true),
                ]),
        );
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let messages = pipeline.render(&DomainEvent::motion(DeviceName::new("porch"), false, at));

        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[0],
            OutboundMessage::new("cams/porch/events/motion", r#"{"on": false}"#, false)
        );
        assert_eq!(messages[1].payload, at.timestamp_millis().to_string());
        assert_eq!(messages[2].topic, "cams/porch/motion");
    }

    #[test]
    fn test_templates_only() {
        let pipeline = pipeline(PipelineConfig::default().with_default_topics(false));
        let event = DomainEvent::silence(DeviceName::new("porch"));
        assert!(pipeline.render(&event).is_empty());
    }

    #[test]
    fn test_desync_threshold() {
        let pipeline = pipeline(PipelineConfig::default());
        let received = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let porch = DeviceName::new("porch");

        let in_sync = DomainEvent::motion(porch.clone(), true, received - chrono::Duration::minutes(59))
            .with_received_at(received);
        assert!(!pipeline.is_desynchronized(&in_sync));

        let skewed = DomainEvent::motion(porch.clone(), true, received + chrono::Duration::minutes(61))
            .with_received_at(received);
        assert!(pipeline.is_desynchronized(&skewed));

        let exactly = DomainEvent::motion(porch, true, received - chrono::Duration::hours(1))
            .with_received_at(received);
        assert!(!pipeline.is_desynchronized(&exactly));
    }
}
