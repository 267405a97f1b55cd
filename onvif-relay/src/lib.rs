//! # onvif-relay
//!
//! Bridges ONVIF camera events to a publish/subscribe bus.
//!
//! A [`Bridge`] owns the device roster. Every roster change is diffed against
//! the applied roster and turned into subscription and liveness changes by the
//! [`Reconciler`]. Events from subscriptions, liveness probes and the
//! reconciler itself flow through one channel into the
//! [`NotificationPipeline`], which renders them with the configured templates
//! and hands them to a [`PublishSink`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use onvif_liveness::NetworkProber;
//! use onvif_relay::{Bridge, BridgeConfig, LogHeartbeatSink, LogSink, RosterSource};
//! # use onvif_stream::EventSource;
//!
//! # async fn example(source: Arc<dyn EventSource>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::from_file("/config/config.json")?;
//! onvif_relay::logging::init_logging_with_level(
//!     onvif_relay::logging::LoggingMode::Development,
//!     &config.log,
//! )?;
//!
//! let roster = RosterSource::from_config(&config)?;
//! let prober = Arc::new(NetworkProber::new(config.liveness_config().connect_timeout)?);
//! let bridge = Bridge::start(
//!     config,
//!     roster,
//!     source,
//!     prober,
//!     Arc::new(LogSink),
//!     Arc::new(LogHeartbeatSink),
//! )
//! .await?;
//!
//! let snapshot = bridge.snapshot().await?;
//! println!("{} devices online", snapshot.counters.online);
//!
//! bridge.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod config;
mod error;
mod heartbeat;
pub mod logging;
mod pipeline;
mod reconciler;
mod roster;
mod sink;
mod template;

pub use bridge::{Bridge, BridgeHandle, BridgeSnapshot};
pub use config::{
    ApiConfig, BridgeConfig, HeartbeatConfig, PipelineConfig, TimingConfig, DEFAULT_TOPIC_PREFIX,
};
pub use error::{BridgeError, ConfigError, HeartbeatError, PublishError, Result, RosterError};
pub use heartbeat::{report, HealthCounters, HeartbeatSink, LogHeartbeatSink, MemoryHeartbeatStore};
pub use pipeline::NotificationPipeline;
pub use reconciler::{DeviceStatus, Reconciler};
pub use roster::{read_roster_file, FileStamp, RosterSource, RosterWatcher};
pub use sink::{ChannelSink, LogSink, OutboundMessage, PublishSink};
pub use template::{render_template, TemplateRule, TemplateValues};
