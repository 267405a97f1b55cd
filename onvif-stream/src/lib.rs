//! # onvif-stream
//!
//! Manages one event subscription per camera and turns the raw provider
//! events into [`DomainEvent`](onvif_model::DomainEvent)s.
//!
//! Each device gets an independent state machine running on its own tokio
//! task:
//!
//! ```text
//!            ┌──────────── resubscribe ────────────┐
//!            ▼                                     │
//!     ┌────────────┐   success   ┌────────────┐    │
//!     │ Connecting │ ──────────▶ │ Subscribed │ ───┘
//!     └────────────┘             └────────────┘
//!        ▲     │ failure               │ stream error
//!        │     ▼                       ▼
//!        │  ┌────────┐ ◀───────────────┘
//!        └──│ Failed │   (reconnect after backoff)
//!           └────────┘
//! ```
//!
//! The wire protocol is not implemented here. Callers plug it in through the
//! [`EventSource`] / [`EventListener`] traits.

mod config;
mod error;
mod group;
mod normalize;
mod silence;
mod source;
mod subscription;
mod topics;

pub use config::StreamConfig;
pub use error::{NormalizeError, Result, StreamError, SubscriptionError};
pub use group::SubscriptionGroup;
pub use normalize::{normalize, parse_provider_timestamp, split_topic};
pub use source::{ChannelListener, EventListener, EventSource, RawEvent, SimpleItem, SimpleItems};
pub use subscription::SubscriptionState;
pub use topics::{lookup_topic, TopicRule, NAMESPACE_DELIMITER, TOPIC_TABLE};
