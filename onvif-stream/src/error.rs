//! Error types for the onvif-stream crate.

use onvif_model::DeviceName;

/// Errors returned by [`SubscriptionGroup`](crate::SubscriptionGroup) operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A subscription already exists for this device
    #[error("Subscription already exists: {0}")]
    AlreadySubscribed(DeviceName),

    /// No subscription exists for this device
    #[error("Subscription not found: {0}")]
    NotFound(DeviceName),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors reported by an event source or listener.
///
/// These never leave the group as errors: they are turned into Error events
/// and drive the reconnect path.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    /// The device refused the subscription
    #[error("Subscription rejected: {code}")]
    Rejected {
        /// Provider error code
        code: String,
    },

    /// A network error occurred
    #[error("Network error: {0}")]
    Network(String),

    /// The event stream ended without an error
    #[error("Event stream closed")]
    StreamClosed,

    /// Failed to unsubscribe
    #[error("Unsubscribe failed: {0}")]
    UnsubscribeFailed(String),
}

impl SubscriptionError {
    /// Code published as the payload of the Error event.
    pub fn code(&self) -> String {
        match self {
            SubscriptionError::Rejected { code } => code.clone(),
            SubscriptionError::Network(_) => "ENETWORK".to_string(),
            SubscriptionError::StreamClosed => "ESTREAMCLOSED".to_string(),
            SubscriptionError::UnsubscribeFailed(_) => "EUNSUBSCRIBE".to_string(),
        }
    }
}

/// Reasons a raw event could not be normalized. The event is dropped.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The topic has no `namespace:` prefix
    #[error("Topic has no namespace delimiter: {0}")]
    MissingDelimiter(String),

    /// The event type is not in the topic table
    #[error("Unmapped event type: {0}")]
    Unmapped(String),

    /// The event carries no data items
    #[error("Event {0} has an empty payload")]
    EmptyPayload(String),

    /// No state item holds a boolean
    #[error("Event {0} has no recognizable state")]
    UnrecognizedState(String),
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
