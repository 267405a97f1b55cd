//! Test doubles shared by the bridge integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use onvif_liveness::{ProbeTarget, Prober};
use onvif_model::{Device, DeviceName};
use onvif_relay::{OutboundMessage, PublishError, PublishSink};
use onvif_stream::{
    ChannelListener, EventListener, EventSource, RawEvent, SimpleItem, SimpleItems,
    SubscriptionError,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type Feed = mpsc::Sender<Result<RawEvent, SubscriptionError>>;

/// Accepts every subscription and lets the test push raw events.
#[derive(Default)]
pub struct FakeCameras {
    feeds: Mutex<HashMap<DeviceName, Feed>>,
    subscribed: Mutex<Vec<Device>>,
}

impl FakeCameras {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, name: &str, event: RawEvent) -> bool {
        self.feeds
            .lock()
            .get(&DeviceName::new(name))
            .map(|feed| feed.try_send(Ok(event)).is_ok())
            .unwrap_or(false)
    }

    /// Every device a subscribe call was made for, in call order.
    pub fn subscribed(&self) -> Vec<Device> {
        self.subscribed.lock().clone()
    }
}

#[async_trait]
impl EventSource for FakeCameras {
    async fn subscribe(&self, device: &Device) -> Result<Box<dyn EventListener>, SubscriptionError> {
        self.subscribed.lock().push(device.clone());
        let (feed, listener) = ChannelListener::channel(16);
        self.feeds.lock().insert(device.name.clone(), feed);
        Ok(Box::new(listener))
    }
}

/// Reports every host alive unless marked down.
#[derive(Default)]
pub struct FakeNetwork {
    down: Mutex<HashSet<String>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, host: &str, down: bool) {
        let mut hosts = self.down.lock();
        if down {
            hosts.insert(host.to_string());
        } else {
            hosts.remove(host);
        }
    }
}

#[async_trait]
impl Prober for FakeNetwork {
    async fn probe(&self, target: &ProbeTarget) -> bool {
        !self.down.lock().contains(&target.to_string())
    }
}

/// Collects published messages; topics containing `fail_on` are rejected.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<OutboundMessage>>,
    fail_on: Mutex<Option<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, fragment: &str) {
        *self.fail_on.lock() = Some(fragment.to_string());
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .map(|message| message.topic.clone())
            .collect()
    }

    pub fn payload_of(&self, topic: &str) -> Option<String> {
        self.messages
            .lock()
            .iter()
            .rev()
            .find(|message| message.topic == topic)
            .map(|message| message.payload.clone())
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        let rejected = self
            .fail_on
            .lock()
            .as_deref()
            .is_some_and(|fragment| message.topic.contains(fragment));
        if rejected {
            return Err(PublishError::Failed {
                topic: message.topic.clone(),
                reason: "broker unavailable".to_string(),
            });
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

pub fn camera(name: &str, last_octet: u8) -> Device {
    Device::new(name, format!("10.0.0.{last_octet}"), 80)
}

pub fn motion_at(active: bool, at: DateTime<Utc>) -> RawEvent {
    RawEvent::new(
        "tns1:RuleEngine/CellMotionDetector/Motion",
        Some(at.to_rfc3339()),
        SimpleItems::Many(vec![
            SimpleItem::new("VideoSourceConfigurationToken", "VideoSourceToken"),
            SimpleItem::new("IsMotion", active.to_string()),
        ]),
    )
}

/// Let spawned tasks run without advancing paused time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` on real time until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
