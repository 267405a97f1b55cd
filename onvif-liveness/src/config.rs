//! Configuration for the liveness monitor.

use std::time::Duration;

use crate::error::MonitorError;

#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Time between two probes of the same device
    /// Default: 10 seconds
    pub probe_interval: Duration,

    /// Connect timeout of a single probe
    /// Default: 2 seconds
    pub connect_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl LivenessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.probe_interval.is_zero() {
            return Err(MonitorError::Configuration(
                "Probe interval must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(MonitorError::Configuration(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
