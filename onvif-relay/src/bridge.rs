//! The running bridge: one worker task owning the [`Reconciler`].
//!
//! All roster changes, snapshots and heartbeats go through the worker, so the
//! device tables are only ever mutated from one task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use onvif_liveness::{LivenessMonitor, Prober};
use onvif_model::{Device, DeviceName, RosterDiff};
use onvif_stream::{EventSource, SubscriptionGroup};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ConfigError, Result};
use crate::heartbeat::{report, HealthCounters, HeartbeatSink};
use crate::pipeline::NotificationPipeline;
use crate::reconciler::{DeviceStatus, Reconciler};
use crate::roster::{FileStamp, RosterSource, RosterWatcher};
use crate::sink::PublishSink;

const CONTROL_CHANNEL_SIZE: usize = 4;

/// Requests from a [`BridgeHandle`] to the worker.
#[derive(Debug)]
enum Command {
    ApplyRoster {
        devices: Vec<Device>,
        reply: oneshot::Sender<RosterDiff<Device>>,
    },
    Resubscribe {
        name: DeviceName,
        reply: oneshot::Sender<std::result::Result<(), onvif_stream::StreamError>>,
    },
    Snapshot(oneshot::Sender<BridgeSnapshot>),
    Shutdown,
}

/// Health counters and per-device status at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeSnapshot {
    pub counters: HealthCounters,
    pub devices: BTreeMap<DeviceName, DeviceStatus>,
}

/// Worker state.
pub struct Bridge {
    reconciler: Reconciler,
    heartbeat: Arc<dyn HeartbeatSink>,
    heartbeat_prefix: String,
    heartbeat_interval: Duration,
}

impl Bridge {
    /// Load the roster, start every device and return a handle to the worker.
    ///
    /// A roster that cannot be loaded is fatal here. Later roster file
    /// changes are picked up by a watcher when the source is a file.
    pub async fn start(
        config: BridgeConfig,
        roster: RosterSource,
        source: Arc<dyn EventSource>,
        prober: Arc<dyn Prober>,
        sink: Arc<dyn PublishSink>,
        heartbeat: Arc<dyn HeartbeatSink>,
    ) -> Result<BridgeHandle> {
        config.validate()?;
        // Stamped before the read so an edit racing startup is still reloaded.
        let stamp = match &roster {
            RosterSource::File(path) => FileStamp::read(path).await,
            RosterSource::Static(_) => None,
        };
        let devices = roster.load().await?;

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_size);
        let pipeline = NotificationPipeline::new(config.pipeline_config(), sink)?.spawn(events_rx);

        let group = SubscriptionGroup::new(source, config.stream_config(), events_tx.clone())
            .map_err(ConfigError::from)?;
        let monitor = LivenessMonitor::new(prober, config.liveness_config(), events_tx.clone())
            .map_err(ConfigError::from)?;

        let mut reconciler = Reconciler::new(group, monitor, events_tx);
        reconciler.apply(devices).await;

        let (roster_tx, roster_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let watcher = match &roster {
            RosterSource::File(path) => Some(RosterWatcher::spawn(
                path.clone(),
                config.roster_poll_interval(),
                stamp,
                roster_tx,
            )),
            RosterSource::Static(_) => {
                drop(roster_tx);
                None
            }
        };

        let bridge = Bridge {
            reconciler,
            heartbeat,
            heartbeat_prefix: config.heartbeat.prefix.clone(),
            heartbeat_interval: config.heartbeat_interval(),
        };

        let (command_tx, command_rx) = mpsc::channel(CONTROL_CHANNEL_SIZE);
        let worker = tokio::spawn(bridge.run(command_rx, roster_rx));

        tracing::info!("Bridge started");
        Ok(BridgeHandle {
            commands: command_tx,
            worker: Some(worker),
            pipeline: Some(pipeline),
            watcher,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut rosters: mpsc::Receiver<Vec<Device>>,
    ) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::ApplyRoster { devices, reply }) => {
                        let diff = self.reconciler.apply(devices).await;
                        let _ = reply.send(diff);
                    }
                    Some(Command::Resubscribe { name, reply }) => {
                        let _ = reply.send(self.reconciler.group().resubscribe(&name));
                    }
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!("Bridge worker received shutdown");
                        break;
                    }
                },

                Some(devices) = rosters.recv() => {
                    self.reconciler.apply(devices).await;
                }

                _ = heartbeat.tick() => {
                    let ttl = self.heartbeat_interval * 2;
                    report(
                        self.heartbeat.as_ref(),
                        &self.heartbeat_prefix,
                        self.reconciler.counters(),
                        ttl,
                    )
                    .await;
                }
            }
        }

        self.reconciler.shutdown().await;
        tracing::info!("Bridge worker stopped");
    }

    fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            counters: self.reconciler.counters(),
            devices: self.reconciler.status(),
        }
    }
}

/// Control surface of a running [`Bridge`].
pub struct BridgeHandle {
    commands: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    pipeline: Option<JoinHandle<()>>,
    watcher: Option<RosterWatcher>,
    shutdown_timeout: Duration,
}

impl BridgeHandle {
    /// Replace the roster. Returns the applied diff.
    pub async fn apply_roster(&self, devices: Vec<Device>) -> Result<RosterDiff<Device>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ApplyRoster { devices, reply }).await?;
        response.await.map_err(|_| BridgeError::WorkerStopped)
    }

    /// Drop the subscription of `name` and subscribe again.
    pub async fn resubscribe(&self, name: impl Into<DeviceName>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Resubscribe {
            name: name.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| BridgeError::WorkerStopped)??;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<BridgeSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        response.await.map_err(|_| BridgeError::WorkerStopped)
    }

    /// Stop watching the roster, tear down every device and drain the pipeline.
    ///
    /// Device teardown is bounded by twice the shutdown timeout, the pipeline
    /// drain by the shutdown timeout. A task that overruns is aborted.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop().await;
        }

        let _ = self.commands.send(Command::Shutdown).await;

        if let Some(worker) = self.worker.take() {
            join_bounded(worker, self.shutdown_timeout * 2, "Bridge worker").await?;
        }
        if let Some(pipeline) = self.pipeline.take() {
            join_bounded(pipeline, self.shutdown_timeout, "Notification pipeline").await?;
        }

        tracing::info!("Bridge shut down");
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BridgeError::WorkerStopped)
    }
}

async fn join_bounded(mut task: JoinHandle<()>, limit: Duration, name: &str) -> Result<()> {
    match timeout(limit, &mut task).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BridgeError::Shutdown(format!("{name} panicked: {e}"))),
        Err(_) => {
            task.abort();
            Err(BridgeError::Shutdown(format!(
                "{name} did not stop within {}s",
                limit.as_secs()
            )))
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.abort();
        }
    }
}
