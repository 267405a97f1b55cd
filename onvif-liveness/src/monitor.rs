//! Per-device probe tasks with edge-triggered reporting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use onvif_model::{Device, DeviceName, DomainEvent};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::LivenessConfig;
use crate::error::{MonitorError, Result};
use crate::probe::{ProbeTarget, Prober};

/// Last known reachability of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LivenessRecord {
    pub alive: bool,
    /// When `alive` last changed, or when the device was added
    pub last_transition: DateTime<Utc>,
}

impl LivenessRecord {
    fn seeded() -> Self {
        Self {
            alive: true,
            last_transition: Utc::now(),
        }
    }
}

type SharedRecords = Arc<RwLock<HashMap<DeviceName, LivenessRecord>>>;

struct ProbeEntry {
    target: ProbeTarget,
    task: JoinHandle<()>,
}

/// Probes every monitored device on its own task and reports transitions.
///
/// A device starts out assumed online and is probed immediately, then every
/// `probe_interval`. An Online or Offline event is sent only when a probe
/// result differs from the stored state.
pub struct LivenessMonitor {
    prober: Arc<dyn Prober>,
    config: LivenessConfig,
    events: mpsc::Sender<DomainEvent>,
    entries: HashMap<DeviceName, ProbeEntry>,
    records: SharedRecords,
}

impl LivenessMonitor {
    pub fn new(
        prober: Arc<dyn Prober>,
        config: LivenessConfig,
        events: mpsc::Sender<DomainEvent>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            prober,
            config,
            events,
            entries: HashMap::new(),
            records: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Start probing `device`.
    pub fn add(&mut self, device: &Device) -> Result<()> {
        if self.entries.contains_key(&device.name) {
            return Err(MonitorError::AlreadyMonitored(device.name.clone()));
        }

        let target = ProbeTarget::for_device(device);
        tracing::debug!(device = %device.name, probe = %target, "Adding liveness probe");

        self.records
            .write()
            .insert(device.name.clone(), LivenessRecord::seeded());

        let task = tokio::spawn(probe_loop(
            device.name.clone(),
            target.clone(),
            Arc::clone(&self.prober),
            self.config.probe_interval,
            Arc::clone(&self.records),
            self.events.clone(),
        ));

        self.entries
            .insert(device.name.clone(), ProbeEntry { target, task });
        Ok(())
    }

    /// Stop probing `name` and forget its record.
    ///
    /// The probe task has finished when this returns, so no further event
    /// for the device is sent. Returns `false` for unknown devices.
    pub async fn remove(&mut self, name: &DeviceName) -> bool {
        self.remove_many(std::slice::from_ref(name)).await == 1
    }

    /// Stop probing several devices. Returns how many were monitored.
    pub async fn remove_many(&mut self, names: &[DeviceName]) -> usize {
        join_all(
            self.entries
                .iter_mut()
                .filter(|(name, _)| names.contains(name))
                .map(|(_, entry)| {
                    entry.task.abort();
                    &mut entry.task
                }),
        )
        .await;

        let mut removed = 0;
        let mut records = self.records.write();
        for name in names {
            if self.entries.remove(name).is_some() {
                records.remove(name);
                removed += 1;
                tracing::debug!(device = %name, "Removed liveness probe");
            }
        }
        removed
    }

    /// Consistent copy of every record.
    pub fn records(&self) -> HashMap<DeviceName, LivenessRecord> {
        self.records.read().clone()
    }

    pub fn record(&self, name: &DeviceName) -> Option<LivenessRecord> {
        self.records.read().get(name).copied()
    }

    pub fn target(&self, name: &DeviceName) -> Option<&ProbeTarget> {
        self.entries.get(name).map(|entry| &entry.target)
    }

    pub fn contains(&self, name: &DeviceName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop every probe task.
    pub async fn shutdown_all(&mut self) {
        let tasks: Vec<JoinHandle<()>> = self
            .entries
            .drain()
            .map(|(_, entry)| {
                entry.task.abort();
                entry.task
            })
            .collect();
        let count = tasks.len();

        join_all(tasks).await;
        self.records.write().clear();
        tracing::info!("Stopped {} liveness probes", count);
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            entry.task.abort();
        }
    }
}

async fn probe_loop(
    device: DeviceName,
    target: ProbeTarget,
    prober: Arc<dyn Prober>,
    interval: std::time::Duration,
    records: SharedRecords,
    events: mpsc::Sender<DomainEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick completes immediately.
        ticker.tick().await;

        let alive = prober.probe(&target).await;
        let Some(at) = record_probe(&records, &device, alive) else {
            continue;
        };

        tracing::info!(device = %device, alive, "Liveness changed");
        if events
            .send(DomainEvent::liveness(device.clone(), alive, at))
            .await
            .is_err()
        {
            tracing::debug!(device = %device, "Event receiver dropped, stopping probe");
            return;
        }
    }
}

/// Store a probe result, returning the transition time when it flipped the state.
fn record_probe(records: &SharedRecords, device: &DeviceName, alive: bool) -> Option<DateTime<Utc>> {
    let mut records = records.write();
    let record = records.get_mut(device)?;
    if record.alive == alive {
        return None;
    }

    let now = Utc::now();
    record.alive = alive;
    record.last_transition = now;
    Some(now)
}
