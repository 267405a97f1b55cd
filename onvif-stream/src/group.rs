//! The set of live device subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use onvif_model::{Device, DeviceName, DomainEvent};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::source::EventSource;
use crate::subscription::{SharedStates, Subscription, SubscriptionState};

/// Owns one subscription state machine per device.
///
/// Every device added to the group gets its own task that subscribes,
/// normalizes events and reconnects after failures, plus a silence timer.
/// All of them feed the same event channel.
///
/// Removing a device cancels its timers and unsubscribes before the device
/// is dropped from the group, so no event for a removed device is produced
/// once [`remove`](Self::remove) returns.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use onvif_model::Device;
/// # use onvif_stream::{EventSource, StreamConfig, SubscriptionGroup};
/// # async fn example(source: Arc<dyn EventSource>) -> onvif_stream::Result<()> {
/// let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(256);
/// let mut group = SubscriptionGroup::new(source, StreamConfig::default(), events_tx)?;
///
/// group.add(Device::new("porch", "192.168.1.20", 80))?;
///
/// while let Some(event) = events_rx.recv().await {
///     println!("{}: {}", event.device, event.kind);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubscriptionGroup {
    source: Arc<dyn EventSource>,
    config: StreamConfig,
    events: mpsc::Sender<DomainEvent>,
    subscriptions: HashMap<DeviceName, Subscription>,
    states: SharedStates,
}

impl SubscriptionGroup {
    /// Create an empty group delivering events to `events`.
    pub fn new(
        source: Arc<dyn EventSource>,
        config: StreamConfig,
        events: mpsc::Sender<DomainEvent>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            config,
            events,
            subscriptions: HashMap::new(),
            states: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start a subscription for `device`.
    ///
    /// Returns immediately; the first subscribe attempt happens on the
    /// device's task after the jitter delay.
    pub fn add(&mut self, device: Device) -> Result<()> {
        if self.subscriptions.contains_key(&device.name) {
            return Err(StreamError::AlreadySubscribed(device.name));
        }

        let name = device.name.clone();
        tracing::debug!(device = %name, "Adding subscription");

        // Seed the state before the task starts so its first update lands.
        self.states
            .write()
            .insert(name.clone(), SubscriptionState::Connecting);

        let subscription = Subscription::spawn(
            device,
            Arc::clone(&self.source),
            &self.config,
            self.events.clone(),
            Arc::clone(&self.states),
        );
        self.subscriptions.insert(name, subscription);
        Ok(())
    }

    /// Tear down the subscription for `name`.
    ///
    /// Cancels the device's timers, unsubscribes, and only then forgets the
    /// device. Returns `false` when the device was not in the group.
    pub async fn remove(&mut self, name: &DeviceName) -> bool {
        self.remove_many(std::slice::from_ref(name)).await == 1
    }

    /// Tear down several subscriptions concurrently. Unknown names are
    /// ignored; returns how many were removed.
    pub async fn remove_many(&mut self, names: &[DeviceName]) -> usize {
        let grace = self.config.shutdown_timeout;
        join_all(
            self.subscriptions
                .iter_mut()
                .filter(|(name, _)| names.contains(name))
                .map(|(_, subscription)| subscription.destroy(grace)),
        )
        .await;

        let mut removed = 0;
        let mut states = self.states.write();
        for name in names {
            if self.subscriptions.remove(name).is_some() {
                states.remove(name);
                removed += 1;
                tracing::debug!(device = %name, "Removed subscription");
            }
        }
        removed
    }

    /// Drop the current subscription of `name` and subscribe again.
    pub fn resubscribe(&self, name: &DeviceName) -> Result<()> {
        let subscription = self
            .subscriptions
            .get(name)
            .ok_or_else(|| StreamError::NotFound(name.clone()))?;

        if !subscription.resubscribe() {
            tracing::warn!(device = %name, "Subscription task is not running");
        }
        Ok(())
    }

    /// Snapshot of every device's subscription state.
    pub fn states(&self) -> HashMap<DeviceName, SubscriptionState> {
        self.states.read().clone()
    }

    pub fn state(&self, name: &DeviceName) -> Option<SubscriptionState> {
        self.states.read().get(name).copied()
    }

    pub fn contains(&self, name: &DeviceName) -> bool {
        self.subscriptions.contains_key(name)
    }

    pub fn device(&self, name: &DeviceName) -> Option<&Device> {
        self.subscriptions.get(name).map(Subscription::device)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.subscriptions.values().map(Subscription::device)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Tear down every subscription concurrently.
    pub async fn shutdown_all(&mut self) {
        let grace = self.config.shutdown_timeout;
        join_all(
            self.subscriptions
                .values_mut()
                .map(|subscription| subscription.destroy(grace)),
        )
        .await;

        let count = self.subscriptions.len();
        self.subscriptions.clear();
        self.states.write().clear();
        tracing::info!("Shut down {} subscriptions", count);
    }
}
