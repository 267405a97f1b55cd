//! Configuration for the subscription group.

use std::time::Duration;

use crate::error::StreamError;

/// Timing policy shared by every subscription in a group.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Reconnect backoff for devices that do not set their own
    /// Default: 10 seconds
    pub default_reconnect: Duration,

    /// Silence window after which a Silence event is emitted
    /// Default: 24 hours
    pub silence_window: Duration,

    /// Upper bound of the random delay before each subscribe call
    /// Default: 5 seconds
    pub subscribe_jitter_max: Duration,

    /// How long a destroyed subscription may take to unsubscribe before its task is aborted
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_reconnect: Duration::from_secs(10),
            silence_window: Duration::from_secs(24 * 60 * 60),
            subscribe_jitter_max: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl StreamConfig {
    /// Create a new StreamConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.default_reconnect.is_zero() {
            return Err(StreamError::Configuration(
                "Default reconnect interval must be greater than 0".to_string(),
            ));
        }

        if self.silence_window.is_zero() {
            return Err(StreamError::Configuration(
                "Silence window must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(StreamError::Configuration(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_default_reconnect(mut self, interval: Duration) -> Self {
        self.default_reconnect = interval;
        self
    }

    pub fn with_silence_window(mut self, window: Duration) -> Self {
        self.silence_window = window;
        self
    }

    pub fn with_subscribe_jitter(mut self, max: Duration) -> Self {
        self.subscribe_jitter_max = max;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
