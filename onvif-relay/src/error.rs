//! Error types for the onvif-relay crate.

use std::path::PathBuf;

use onvif_liveness::MonitorError;
use onvif_model::DeviceError;
use onvif_stream::StreamError;

/// A message could not be handed to the publish sink.
///
/// Publish failures are logged per message and never retried.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish sink closed")]
    Closed,

    #[error("Failed to publish to {topic}: {reason}")]
    Failed { topic: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("Heartbeat store unavailable: {0}")]
    Unavailable(String),
}

/// Roster loading errors. Fatal at startup, logged during hot-reload.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("Failed to read roster file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Roster file {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid roster: {0}")]
    Invalid(#[from] DeviceError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("log must be one of [trace,debug,info,warn,error,fatal], got {0:?}")]
    InvalidLogLevel(String),

    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),

    #[error("api.templates[{0}].subtopic is required")]
    MissingSubtopic(usize),

    #[error("topicPrefix must not be empty")]
    EmptyTopicPrefix,

    #[error("Stream configuration: {0}")]
    Stream(#[from] StreamError),

    #[error("Liveness configuration: {0}")]
    Liveness(#[from] MonitorError),
}

/// Errors surfaced by [`Bridge`](crate::Bridge) and [`BridgeHandle`](crate::BridgeHandle).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Bridge worker is not running")]
    WorkerStopped,

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
