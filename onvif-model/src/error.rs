//! Error types for the onvif-model crate.

use crate::device::DeviceName;

/// Reasons a roster entry is rejected.
///
/// Every variant is a ConfigInvalid condition: the offending entry is skipped
/// and the rest of the roster is still applied.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The roster document is not a JSON array
    #[error("Roster must be a JSON array of devices")]
    RosterNotAnArray,

    /// A roster entry is not a JSON object
    #[error("Roster entry {index} is not an object")]
    NotAnObject {
        /// Position of the entry in the roster
        index: usize,
    },

    /// A required field is absent
    #[error("Roster entry {index} is missing required field `{field}`")]
    MissingField {
        /// Position of the entry in the roster
        index: usize,
        /// Name of the missing field
        field: &'static str,
    },

    /// A required field is present but empty
    #[error("Device {name}: field `{field}` must not be empty")]
    EmptyField {
        /// The device name (may itself be empty)
        name: DeviceName,
        /// Name of the empty field
        field: &'static str,
    },

    /// The port is zero
    #[error("Device {name}: port must be non-zero")]
    InvalidPort {
        /// The device name
        name: DeviceName,
    },

    /// The alternate probe URL does not parse
    #[error("Device {name}: invalid probe URL: {source}")]
    InvalidProbeUrl {
        /// The device name
        name: DeviceName,
        /// Underlying parse error
        #[source]
        source: url::ParseError,
    },

    /// A field has the wrong type or shape
    #[error("Roster entry {index} is malformed: {source}")]
    Malformed {
        /// Position of the entry in the roster
        index: usize,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// Another entry earlier in the roster already uses this name
    #[error("Duplicate device name: {name}")]
    DuplicateName {
        /// The repeated name
        name: DeviceName,
    },
}

/// Convenience type alias for Results using DeviceError.
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let error = DeviceError::MissingField {
            index: 2,
            field: "hostname",
        };
        assert_eq!(
            error.to_string(),
            "Roster entry 2 is missing required field `hostname`"
        );

        let error = DeviceError::InvalidPort {
            name: DeviceName::new("cam1"),
        };
        assert_eq!(error.to_string(), "Device cam1: port must be non-zero");

        let error = DeviceError::DuplicateName {
            name: DeviceName::new("cam1"),
        };
        assert_eq!(error.to_string(), "Duplicate device name: cam1");
    }
}
