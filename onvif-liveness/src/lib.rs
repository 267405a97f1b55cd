//! # onvif-liveness
//!
//! Periodic reachability probing of roster devices.
//!
//! Every monitored device gets its own probe task. The first probe runs as
//! soon as the device is added, then on a fixed cadence. Only changes of the
//! alive flag are reported, as [`Online`](onvif_model::EventKind::Online) or
//! [`Offline`](onvif_model::EventKind::Offline) events:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use onvif_liveness::{LivenessConfig, LivenessMonitor, NetworkProber};
//! use onvif_model::Device;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LivenessConfig::default();
//! let prober = Arc::new(NetworkProber::new(config.connect_timeout)?);
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(64);
//!
//! let mut monitor = LivenessMonitor::new(prober, config, events_tx)?;
//! monitor.add(&Device::new("porch", "192.168.1.20", 80))?;
//!
//! while let Some(event) = events_rx.recv().await {
//!     println!("{} is {}", event.device, event.kind);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod monitor;
mod probe;

pub use config::LivenessConfig;
pub use error::{MonitorError, ProbeError, Result};
pub use monitor::{LivenessMonitor, LivenessRecord};
pub use probe::{is_success_status_line, NetworkProber, ProbeTarget, Prober};
