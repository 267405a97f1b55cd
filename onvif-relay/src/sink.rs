//! The publish side of the bridge.
//!
//! The bus transport lives outside this crate; it plugs in by implementing
//! [`PublishSink`].

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::PublishError;

/// A rendered message ready for the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }
}

/// Best-effort message delivery.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError>;
}

/// Writes every message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl PublishSink for LogSink {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        tracing::info!(
            topic = %message.topic,
            payload = %message.payload,
            retain = message.retain,
            "Publishing"
        );
        Ok(())
    }
}

/// Forwards messages into a tokio channel, e.g. to a transport task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl PublishSink for ChannelSink {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| PublishError::Closed)
    }
}
