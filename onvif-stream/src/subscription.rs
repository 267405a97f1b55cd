//! One device's subscription state machine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use onvif_model::{Device, DeviceName, DomainEvent};
use rand::Rng;
use serde::Serialize;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::StreamConfig;
use crate::error::{NormalizeError, SubscriptionError};
use crate::normalize::normalize;
use crate::silence::SilenceTimer;
use crate::source::{EventListener, EventSource, RawEvent};

/// Connection state of a device subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubscriptionState {
    /// Waiting for the provider to accept the subscription
    Connecting,
    /// Receiving events
    Subscribed,
    /// The last attempt failed; a reconnect is scheduled
    Failed,
}

pub(crate) type SharedStates = Arc<RwLock<HashMap<DeviceName, SubscriptionState>>>;

/// Commands accepted by a running subscription task.
#[derive(Debug)]
pub(crate) enum Control {
    Resubscribe,
    Shutdown,
}

/// Handle to a running device subscription.
///
/// The handle owns every timer of the device: the subscription task (which
/// holds the jitter and reconnect delays) and the silence timer.
pub(crate) struct Subscription {
    device: Device,
    control: mpsc::UnboundedSender<Control>,
    task: Option<JoinHandle<()>>,
    silence: SilenceTimer,
}

impl Subscription {
    pub(crate) fn spawn(
        device: Device,
        source: Arc<dyn EventSource>,
        config: &StreamConfig,
        events: mpsc::Sender<DomainEvent>,
        states: SharedStates,
    ) -> Self {
        let (control, control_rx) = mpsc::unbounded_channel();
        let silence = SilenceTimer::start(device.name.clone(), config.silence_window, events.clone());

        let task = SubscriptionTask {
            reconnect: device.reconnect_interval(config.default_reconnect),
            jitter_max: config.subscribe_jitter_max,
            device: device.clone(),
            source,
            control: control_rx,
            events,
            silence: silence.reset_handle(),
            states,
        };

        Self {
            device,
            control,
            task: Some(tokio::spawn(task.run())),
            silence,
        }
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    /// Ask the task to tear down the current subscription and subscribe again.
    pub(crate) fn resubscribe(&self) -> bool {
        self.control.send(Control::Resubscribe).is_ok()
    }

    /// Stop every timer of the device and wait for the task to unsubscribe.
    ///
    /// The task answers shutdown at every await point except the
    /// `unsubscribe` call itself, so an open listener has always been asked
    /// to detach before `grace` can run out. A task still running after
    /// `grace` is aborted.
    pub(crate) async fn destroy(&mut self, grace: Duration) {
        self.silence.cancel().await;

        let Some(mut task) = self.task.take() else {
            return;
        };

        let _ = self.control.send(Control::Shutdown);
        match timeout(grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(device = %self.device.name, "Subscription task failed: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    device = %self.device.name,
                    "Subscription task did not stop within {:?}, aborting",
                    grace
                );
                task.abort();
                let _ = task.await;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

enum Outcome<T> {
    Ready(T),
    Resubscribe,
    Shutdown,
}

/// Run `fut` unless a control command arrives first.
async fn race<F: Future>(
    control: &mut mpsc::UnboundedReceiver<Control>,
    fut: F,
) -> Outcome<F::Output> {
    tokio::select! {
        output = fut => Outcome::Ready(output),
        command = control.recv() => match command {
            Some(Control::Resubscribe) => Outcome::Resubscribe,
            Some(Control::Shutdown) | None => Outcome::Shutdown,
        },
    }
}

enum PumpExit {
    Resubscribe,
    Shutdown,
    Failed(SubscriptionError),
}

fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

struct SubscriptionTask {
    device: Device,
    source: Arc<dyn EventSource>,
    control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::Sender<DomainEvent>,
    silence: Arc<Notify>,
    states: SharedStates,
    reconnect: Duration,
    jitter_max: Duration,
}

impl SubscriptionTask {
    async fn run(mut self) {
        loop {
            self.set_state(SubscriptionState::Connecting);

            match race(&mut self.control, tokio::time::sleep(jitter(self.jitter_max))).await {
                Outcome::Ready(()) => {}
                Outcome::Resubscribe => continue,
                Outcome::Shutdown => break,
            }

            tracing::debug!(device = %self.device.name, "Subscribing to device events");
            let failure = match race(&mut self.control, self.source.subscribe(&self.device)).await {
                Outcome::Ready(Ok(mut listener)) => {
                    self.set_state(SubscriptionState::Subscribed);
                    tracing::info!(device = %self.device.name, "Subscribed to device events");

                    let exit = self.pump(listener.as_mut()).await;
                    if let Err(e) = listener.unsubscribe().await {
                        tracing::warn!(device = %self.device.name, "Failed to unsubscribe: {}", e);
                    }

                    match exit {
                        PumpExit::Resubscribe => continue,
                        PumpExit::Shutdown => break,
                        PumpExit::Failed(e) => e,
                    }
                }
                Outcome::Ready(Err(e)) => e,
                Outcome::Resubscribe => continue,
                Outcome::Shutdown => break,
            };

            tracing::warn!(
                device = %self.device.name,
                "Subscription failed, reconnecting in {:?}: {}",
                self.reconnect,
                failure
            );
            self.set_state(SubscriptionState::Failed);
            if !self.emit(DomainEvent::error(self.device.name.clone(), failure.code())).await {
                break;
            }

            match race(&mut self.control, tokio::time::sleep(self.reconnect)).await {
                Outcome::Ready(()) | Outcome::Resubscribe => {}
                Outcome::Shutdown => break,
            }
        }

        tracing::debug!(device = %self.device.name, "Subscription task stopped");
    }

    async fn pump(&mut self, listener: &mut dyn EventListener) -> PumpExit {
        loop {
            match race(&mut self.control, listener.next_event()).await {
                Outcome::Ready(Some(Ok(raw))) => {
                    let Some(event) = self.accept(&raw) else {
                        continue;
                    };
                    // A full event channel must not hold off shutdown.
                    match race(&mut self.control, self.events.send(event)).await {
                        Outcome::Ready(Ok(())) => {}
                        Outcome::Ready(Err(_)) => {
                            tracing::debug!(device = %self.device.name, "Event receiver dropped, stopping subscription");
                            return PumpExit::Shutdown;
                        }
                        Outcome::Resubscribe => return PumpExit::Resubscribe,
                        Outcome::Shutdown => return PumpExit::Shutdown,
                    }
                }
                Outcome::Ready(Some(Err(e))) => return PumpExit::Failed(e),
                Outcome::Ready(None) => return PumpExit::Failed(SubscriptionError::StreamClosed),
                Outcome::Resubscribe => return PumpExit::Resubscribe,
                Outcome::Shutdown => return PumpExit::Shutdown,
            }
        }
    }

    /// Normalize `raw`. Only mapped events restart the silence window.
    fn accept(&self, raw: &RawEvent) -> Option<DomainEvent> {
        match normalize(&self.device.name, raw) {
            Ok(event) => {
                self.silence.notify_one();
                Some(event)
            }
            Err(NormalizeError::Unmapped(event_type)) => {
                tracing::debug!(device = %self.device.name, event_type = %event_type, "Dropping unmapped event");
                None
            }
            Err(e) => {
                tracing::warn!(device = %self.device.name, "Dropping event: {}", e);
                None
            }
        }
    }

    async fn emit(&self, event: DomainEvent) -> bool {
        if self.events.send(event).await.is_err() {
            tracing::debug!(device = %self.device.name, "Event receiver dropped, stopping subscription");
            return false;
        }
        true
    }

    fn set_state(&self, state: SubscriptionState) {
        if let Some(current) = self.states.write().get_mut(&self.device.name) {
            *current = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_within_bounds() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(Duration::from_secs(5)) <= Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_race_prefers_control_commands() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Control::Resubscribe).unwrap();
        let outcome = race(&mut rx, std::future::pending::<()>()).await;
        assert!(matches!(outcome, Outcome::Resubscribe));

        drop(tx);
        let outcome = race(&mut rx, std::future::pending::<()>()).await;
        assert!(matches!(outcome, Outcome::Shutdown));
    }
}
