//! The event-subscription capability the group drives.
//!
//! The ONVIF pull-point protocol lives outside this crate. An adapter
//! implements [`EventSource`] to open a subscription and [`EventListener`] to
//! deliver the events of an open subscription.

use std::collections::BTreeMap;

use async_trait::async_trait;
use onvif_model::Device;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SubscriptionError;

/// One `Name=Value` data item of a provider event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleItem {
    pub name: String,
    pub value: String,
}

impl SimpleItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Data items of a provider event. Providers send a bare item when there is
/// only one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimpleItems {
    One(SimpleItem),
    Many(Vec<SimpleItem>),
}

impl SimpleItems {
    /// Fold the items into a single mapping. Later items overwrite earlier ones.
    pub fn fold(&self) -> BTreeMap<String, String> {
        match self {
            SimpleItems::One(item) => std::iter::once(item)
                .map(|i| (i.name.clone(), i.value.clone()))
                .collect(),
            SimpleItems::Many(items) => items
                .iter()
                .map(|i| (i.name.clone(), i.value.clone()))
                .collect(),
        }
    }
}

/// An event as delivered by the provider, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Namespaced topic, e.g. `tns1:RuleEngine/CellMotionDetector/Motion`
    pub topic: String,
    /// Provider timestamp, usually without a timezone suffix
    pub utc_time: Option<String>,
    /// Data items
    pub items: SimpleItems,
}

impl RawEvent {
    pub fn new(topic: impl Into<String>, utc_time: Option<String>, items: SimpleItems) -> Self {
        Self {
            topic: topic.into(),
            utc_time,
            items,
        }
    }
}

/// Opens event subscriptions on devices.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Subscribe to the device's event stream.
    ///
    /// Resolves once the provider has accepted or rejected the subscription.
    async fn subscribe(&self, device: &Device) -> Result<Box<dyn EventListener>, SubscriptionError>;
}

/// An open subscription.
#[async_trait]
pub trait EventListener: Send {
    /// Wait for the next event.
    ///
    /// `Some(Err(_))` reports a subscription failure; `None` means the stream
    /// ended. Either way the subscription is considered failed afterwards.
    async fn next_event(&mut self) -> Option<Result<RawEvent, SubscriptionError>>;

    /// Detach from the device. Must be idempotent.
    async fn unsubscribe(&mut self) -> Result<(), SubscriptionError>;
}

/// Listener fed through a tokio channel.
///
/// Lets a protocol adapter that runs its own I/O push events into the group.
pub struct ChannelListener {
    receiver: mpsc::Receiver<Result<RawEvent, SubscriptionError>>,
    detached: bool,
}

impl ChannelListener {
    /// Create a listener and the sender feeding it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<RawEvent, SubscriptionError>>, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        (
            sender,
            Self {
                receiver,
                detached: false,
            },
        )
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

#[async_trait]
impl EventListener for ChannelListener {
    async fn next_event(&mut self) -> Option<Result<RawEvent, SubscriptionError>> {
        if self.detached {
            return None;
        }
        self.receiver.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<(), SubscriptionError> {
        if !self.detached {
            self.detached = true;
            self.receiver.close();
        }
        Ok(())
    }
}
