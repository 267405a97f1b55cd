//! Applies roster changes to the subscription group and the liveness monitor.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use onvif_liveness::LivenessMonitor;
use onvif_model::{diff_roster, Device, DeviceName, DomainEvent, EventKind, RosterDiff};
use onvif_stream::{SubscriptionGroup, SubscriptionState};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::heartbeat::HealthCounters;

/// Per-device view combining subscription and liveness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub subscription: Option<SubscriptionState>,
    pub alive: Option<bool>,
    pub last_transition: Option<DateTime<Utc>>,
}

/// Owns the applied roster and keeps the group and monitor in step with it.
///
/// Every device in the roster has exactly one subscription and one liveness
/// probe once [`apply`](Self::apply) returns.
pub struct Reconciler {
    roster: Vec<Device>,
    group: SubscriptionGroup,
    monitor: LivenessMonitor,
    events: mpsc::Sender<DomainEvent>,
}

impl Reconciler {
    pub fn new(
        group: SubscriptionGroup,
        monitor: LivenessMonitor,
        events: mpsc::Sender<DomainEvent>,
    ) -> Self {
        Self {
            roster: Vec::new(),
            group,
            monitor,
            events,
        }
    }

    /// The last applied roster.
    pub fn roster(&self) -> &[Device] {
        &self.roster
    }

    pub fn group(&self) -> &SubscriptionGroup {
        &self.group
    }

    pub fn monitor(&self) -> &LivenessMonitor {
        &self.monitor
    }

    /// Bring the running state in line with `next`.
    ///
    /// Removed devices are torn down first, then added devices start, then
    /// updated devices are torn down and started again. Each operation emits
    /// one lifecycle event.
    pub async fn apply(&mut self, next: Vec<Device>) -> RosterDiff<Device> {
        let diff = diff_roster(&self.roster, &next);
        if diff.is_empty() {
            tracing::debug!(devices = next.len(), "Roster unchanged");
            self.roster = next;
            return diff;
        }

        tracing::info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            updated = diff.updated.len(),
            "Applying roster change"
        );

        let removed = names(&diff.removed);
        self.destroy(&removed).await;
        for name in removed {
            tracing::info!(device = %name, "Device removed");
            self.emit(DomainEvent::lifecycle(name, EventKind::Unsubscribed))
                .await;
        }

        for device in &diff.added {
            self.create(device);
            tracing::info!(device = %device.name, "Device added");
            self.emit(DomainEvent::lifecycle(device.name.clone(), EventKind::Subscribed))
                .await;
        }

        // Teardown of every updated device completes before any is recreated.
        self.destroy(&names(&diff.updated)).await;
        for device in &diff.updated {
            self.create(device);
            tracing::info!(device = %device.name, "Device updated");
            self.emit(DomainEvent::lifecycle(device.name.clone(), EventKind::Updated))
                .await;
        }

        self.roster = next;
        diff
    }

    /// Aggregate counters read from one snapshot of each table.
    pub fn counters(&self) -> HealthCounters {
        let states = self.group.states();
        let records = self.monitor.records();

        let online = records.values().filter(|record| record.alive).count();
        HealthCounters {
            total: self.roster.len(),
            subscribed: states
                .values()
                .filter(|state| **state == SubscriptionState::Subscribed)
                .count(),
            online,
            offline: records.len() - online,
        }
    }

    /// Status of every device in the roster, ordered by name.
    pub fn status(&self) -> BTreeMap<DeviceName, DeviceStatus> {
        let states = self.group.states();
        let records = self.monitor.records();

        self.roster
            .iter()
            .map(|device| {
                let record = records.get(&device.name);
                let status = DeviceStatus {
                    subscription: states.get(&device.name).copied(),
                    alive: record.map(|record| record.alive),
                    last_transition: record.map(|record| record.last_transition),
                };
                (device.name.clone(), status)
            })
            .collect()
    }

    /// Tear down every device without emitting lifecycle events.
    pub async fn shutdown(&mut self) {
        tracing::info!(devices = self.roster.len(), "Shutting down all devices");
        tokio::join!(self.group.shutdown_all(), self.monitor.shutdown_all());
        self.roster.clear();
    }

    async fn destroy(&mut self, names: &[DeviceName]) {
        if names.is_empty() {
            return;
        }
        tokio::join!(
            self.group.remove_many(names),
            self.monitor.remove_many(names)
        );
    }

    fn create(&mut self, device: &Device) {
        if let Err(e) = self.monitor.add(device) {
            tracing::error!(device = %device.name, "Failed to start liveness probe: {}", e);
        }
        if let Err(e) = self.group.add(device.clone()) {
            tracing::error!(device = %device.name, "Failed to start subscription: {}", e);
        }
    }

    async fn emit(&self, event: DomainEvent) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("Event channel closed, dropping lifecycle event");
        }
    }
}

fn names(devices: &[Device]) -> Vec<DeviceName> {
    let mut seen = HashSet::new();
    devices
        .iter()
        .filter(|device| seen.insert(&device.name))
        .map(|device| device.name.clone())
        .collect()
}
