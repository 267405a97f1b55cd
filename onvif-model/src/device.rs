//! Device roster entries.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{DeviceError, Result};

/// Unique name of a device within the roster.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceName(pub String);

impl DeviceName {
    /// Create a new device name from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the device name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for DeviceName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl std::fmt::Display for DeviceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A camera in the roster.
///
/// Fields the model does not know about are kept in `extra` so that a change
/// to any field of the source document counts as an update when rosters are
/// diffed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique device name, the roster identity key
    pub name: DeviceName,
    /// Hostname or IP address of the device
    pub hostname: String,
    /// Port of the device's event service
    pub port: u16,
    /// Optional username for the event service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional password for the event service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Reconnect interval in seconds after a failed subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<u64>,
    /// Alternate liveness target, e.g. the camera's stream URL
    #[serde(default, alias = "streamUrl", skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,
    /// Any other fields present in the roster entry
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields every roster entry must carry.
const REQUIRED_FIELDS: [&str; 3] = ["name", "hostname", "port"];

impl Device {
    /// Create a device with the required fields only.
    pub fn new(name: impl Into<DeviceName>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            port,
            username: None,
            password: None,
            reconnect: None,
            probe_url: None,
            extra: Map::new(),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_reconnect(mut self, seconds: u64) -> Self {
        self.reconnect = Some(seconds);
        self
    }

    pub fn with_probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Parse a single roster entry.
    ///
    /// `index` is the entry's position and only used for error reporting.
    pub fn from_value(index: usize, value: Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or(DeviceError::NotAnObject { index })?;

        if let Some(&field) = REQUIRED_FIELDS
            .iter()
            .find(|field| object.get(**field).map_or(true, Value::is_null))
        {
            return Err(DeviceError::MissingField { index, field });
        }

        let device: Device = serde_json::from_value(value)
            .map_err(|source| DeviceError::Malformed { index, source })?;
        device.validate()?;
        Ok(device)
    }

    /// Check field-level constraints that the type system does not cover.
    pub fn validate(&self) -> Result<()> {
        if self.name.as_str().trim().is_empty() {
            return Err(DeviceError::EmptyField {
                name: self.name.clone(),
                field: "name",
            });
        }
        if self.hostname.trim().is_empty() {
            return Err(DeviceError::EmptyField {
                name: self.name.clone(),
                field: "hostname",
            });
        }
        if self.port == 0 {
            return Err(DeviceError::InvalidPort {
                name: self.name.clone(),
            });
        }
        if let Some(raw) = &self.probe_url {
            Url::parse(raw).map_err(|source| DeviceError::InvalidProbeUrl {
                name: self.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Reconnect backoff for this device, falling back to `default` when unset or zero.
    pub fn reconnect_interval(&self, default: Duration) -> Duration {
        self.reconnect
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    /// The parsed alternate probe URL, if the device declares one.
    pub fn probe_url(&self) -> Option<Url> {
        self.probe_url.as_deref().and_then(|raw| Url::parse(raw).ok())
    }

    /// `hostname:port` of the event service.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Parse a whole roster document, skipping invalid entries.
    ///
    /// Entries are checked one by one; a rejected entry never prevents the
    /// others from loading. When two entries share a name the first one wins.
    pub fn parse_roster(document: Value) -> Result<ParsedRoster> {
        let Value::Array(entries) = document else {
            return Err(DeviceError::RosterNotAnArray);
        };

        let mut parsed = ParsedRoster::default();
        let mut seen = HashSet::new();

        for (index, entry) in entries.into_iter().enumerate() {
            match Device::from_value(index, entry) {
                Ok(device) => {
                    if seen.insert(device.name.clone()) {
                        parsed.devices.push(device);
                    } else {
                        parsed.rejected.push(DeviceError::DuplicateName { name: device.name });
                    }
                }
                Err(e) => parsed.rejected.push(e),
            }
        }

        Ok(parsed)
    }
}

/// Outcome of [`Device::parse_roster`].
#[derive(Debug, Default)]
pub struct ParsedRoster {
    /// Valid devices in roster order
    pub devices: Vec<Device>,
    /// Entries that were skipped, with the reason
    pub rejected: Vec<DeviceError>,
}
