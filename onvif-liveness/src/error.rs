//! Error types for the onvif-liveness crate.

use onvif_model::DeviceName;

/// Errors returned by [`LivenessMonitor`](crate::LivenessMonitor) operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The device is already being probed
    #[error("Device already monitored: {0}")]
    AlreadyMonitored(DeviceName),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Why a probe did not confirm the target alive.
///
/// Probe failures never leave the prober; they are logged and count as
/// `alive = false`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to run ping: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Probe timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status line: {0}")]
    Status(String),

    #[error("Unsupported probe target: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
