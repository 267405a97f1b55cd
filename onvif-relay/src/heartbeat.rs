//! Aggregate health counters and the heartbeat side channel.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::HeartbeatError;

/// Aggregate view over the current roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCounters {
    pub total: usize,
    pub subscribed: usize,
    pub online: usize,
    pub offline: usize,
}

impl HealthCounters {
    /// Heartbeat keys and values for these counters.
    pub fn entries(&self, prefix: &str) -> [(String, usize); 4] {
        [
            (format!("{prefix}:total"), self.total),
            (format!("{prefix}:subscribed"), self.subscribed),
            (format!("{prefix}:online"), self.online),
            (format!("{prefix}:offline"), self.offline),
        ]
    }
}

/// Key/value store with expiry, e.g. a Redis instance.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), HeartbeatError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), HeartbeatError>;
}

/// Write `counters` under `prefix`, each key expiring after `ttl`.
///
/// A failing key is logged and the remaining keys are still written.
pub async fn report(sink: &dyn HeartbeatSink, prefix: &str, counters: HealthCounters, ttl: Duration) {
    for (key, value) in counters.entries(prefix) {
        let result = match sink.set(&key, &value.to_string()).await {
            Ok(()) => sink.expire(&key, ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(key = %key, "Failed to write heartbeat: {}", e);
        }
    }
    tracing::debug!(?counters, "Heartbeat written");
}

/// In-process heartbeat store.
#[derive(Debug, Default)]
pub struct MemoryHeartbeatStore {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl MemoryHeartbeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, `None` once it has expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        let (value, deadline) = entry.value();
        match deadline {
            Some(deadline) if Instant::now() >= *deadline => None,
            _ => Some(value.clone()),
        }
    }

    /// Drop expired keys.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, (_, deadline)| deadline.map_or(true, |deadline| now < deadline));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl HeartbeatSink for MemoryHeartbeatStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), HeartbeatError> {
        self.entries.insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), HeartbeatError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.1 = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

/// Logs heartbeats instead of storing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHeartbeatSink;

#[async_trait]
impl HeartbeatSink for LogHeartbeatSink {
    async fn set(&self, key: &str, value: &str) -> Result<(), HeartbeatError> {
        tracing::info!(key, value, "Heartbeat");
        Ok(())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), HeartbeatError> {
        Ok(())
    }
}
