//! Scriptable event source for exercising the subscription group.
//!
//! Each subscribe attempt pops the next scripted outcome for the device
//! (accepting when the script is empty). Accepted subscriptions are fed
//! through a channel the test can push events and failures into.

use async_trait::async_trait;
use onvif_model::{Device, DeviceName};
use onvif_stream::{
    ChannelListener, EventListener, EventSource, RawEvent, SimpleItem, SimpleItems,
    SubscriptionError,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Feed = mpsc::Sender<Result<RawEvent, SubscriptionError>>;

#[derive(Default)]
pub struct MockSource {
    rejections: Mutex<HashMap<DeviceName, VecDeque<String>>>,
    attempts: Mutex<HashMap<DeviceName, usize>>,
    feeds: Mutex<HashMap<DeviceName, Feed>>,
    unsubscribes: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject the next subscribe attempt for `name` with `code`.
    pub fn reject_next(&self, name: &str, code: &str) {
        self.rejections
            .lock()
            .entry(DeviceName::new(name))
            .or_default()
            .push_back(code.to_string());
    }

    pub fn attempts(&self, name: &str) -> usize {
        self.attempts
            .lock()
            .get(&DeviceName::new(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Deliver `event` on the device's open subscription.
    pub fn push(&self, name: &str, event: RawEvent) -> bool {
        self.send(name, Ok(event))
    }

    /// Fail the device's open subscription.
    pub fn fail(&self, name: &str, error: SubscriptionError) -> bool {
        self.send(name, Err(error))
    }

    fn send(&self, name: &str, item: Result<RawEvent, SubscriptionError>) -> bool {
        self.feeds
            .lock()
            .get(&DeviceName::new(name))
            .map(|feed| feed.try_send(item).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl EventSource for MockSource {
    async fn subscribe(&self, device: &Device) -> Result<Box<dyn EventListener>, SubscriptionError> {
        *self.attempts.lock().entry(device.name.clone()).or_insert(0) += 1;

        let rejection = self
            .rejections
            .lock()
            .get_mut(&device.name)
            .and_then(VecDeque::pop_front);
        if let Some(code) = rejection {
            return Err(SubscriptionError::Rejected { code });
        }

        let (feed, inner) = ChannelListener::channel(16);
        self.feeds.lock().insert(device.name.clone(), feed);

        Ok(Box::new(CountingListener {
            inner,
            unsubscribes: Arc::clone(&self.unsubscribes),
        }))
    }
}

struct CountingListener {
    inner: ChannelListener,
    unsubscribes: Arc<AtomicUsize>,
}

#[async_trait]
impl EventListener for CountingListener {
    async fn next_event(&mut self) -> Option<Result<RawEvent, SubscriptionError>> {
        self.inner.next_event().await
    }

    async fn unsubscribe(&mut self) -> Result<(), SubscriptionError> {
        if !self.inner.is_detached() {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.unsubscribe().await
    }
}

pub fn motion_event(active: bool) -> RawEvent {
    RawEvent::new(
        "tns1:RuleEngine/CellMotionDetector/Motion",
        Some("2024-03-10T08:15:30".to_string()),
        SimpleItems::Many(vec![
            SimpleItem::new("VideoSourceConfigurationToken", "VideoSourceToken"),
            SimpleItem::new("IsMotion", active.to_string()),
        ]),
    )
}

pub fn unmapped_event() -> RawEvent {
    RawEvent::new(
        "tns1:VideoSource/GlobalSceneChange/ImagingService",
        None,
        SimpleItems::One(SimpleItem::new("State", "true")),
    )
}
