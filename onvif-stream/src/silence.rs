//! Per-device silence watchdog.

use std::sync::Arc;
use std::time::Duration;

use onvif_model::{DeviceName, DomainEvent};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Recurring timer that emits a Silence event when no mapped event resets it
/// within the window.
///
/// The timer is owned by the device's subscription; cancelling it stops the
/// task before the device is dropped.
pub(crate) struct SilenceTimer {
    reset: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SilenceTimer {
    pub(crate) fn start(
        device: DeviceName,
        window: Duration,
        events: mpsc::Sender<DomainEvent>,
    ) -> Self {
        let reset = Arc::new(Notify::new());
        let task = tokio::spawn(Self::watch(device, window, Arc::clone(&reset), events));
        Self {
            reset,
            task: Some(task),
        }
    }

    /// Handle used by the subscription task to reset the window.
    pub(crate) fn reset_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.reset)
    }

    /// Stop the timer and wait until its task has finished.
    pub(crate) async fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    async fn watch(
        device: DeviceName,
        window: Duration,
        reset: Arc<Notify>,
        events: mpsc::Sender<DomainEvent>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(window) => {
                    tracing::trace!(device = %device, "No events within silence window");
                    if events.send(DomainEvent::silence(device.clone())).await.is_err() {
                        tracing::debug!(device = %device, "Event receiver dropped, stopping silence timer");
                        return;
                    }
                }
                _ = reset.notified() => {}
            }
        }
    }
}

impl Drop for SilenceTimer {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
