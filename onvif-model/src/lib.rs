//! # onvif-model
//!
//! Shared data model for onvif-relay: the device roster, the normalized
//! [`DomainEvent`] stream and the pure [`diff_roster`] function that turns two
//! roster snapshots into add/update/remove operations.
//!
//! This crate has no runtime. Everything here is plain data and deterministic
//! functions so the stateful crates (`onvif-stream`, `onvif-liveness`,
//! `onvif-relay`) can agree on one vocabulary.

mod device;
mod diff;
mod error;
mod event;

pub use device::{Device, DeviceName, ParsedRoster};
pub use diff::{diff_by_key, diff_roster, RosterDiff};
pub use error::{DeviceError, Result};
pub use event::{DomainEvent, EventKind};
