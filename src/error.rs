use std::fmt;

use thiserror::Error;

/// An entry read back from an instrument's error queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, \"{}\"", self.code, self.message)
    }
}

fn join_device_errors(errors: &[DeviceError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Could not parse {response:?}: {reason}")]
    Parse { response: String, reason: String },

    #[error("Property '{0}' is read-only")]
    ReadOnly(String),

    #[error("Property '{0}' is write-only")]
    WriteOnly(String),

    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    #[error("Property '{0}' is not dynamic")]
    NotDynamic(String),

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("Invalid command template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Checksum mismatch: expected {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },

    #[error("CRC mismatch: computed {computed:#06x}, received {received:#06x}")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("Device reported {} error(s): {}", .0.len(), join_device_errors(.0))]
    DeviceReported(Vec<DeviceError>),
}

impl LabError {
    /// Transport and wire-integrity failures, raised after I/O took place.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            LabError::Communication(_)
                | LabError::Timeout(_)
                | LabError::Framing(_)
                | LabError::ChecksumMismatch { .. }
                | LabError::CrcMismatch { .. }
        )
    }

    pub(crate) fn template(template: &str, reason: impl Into<String>) -> Self {
        LabError::Template {
            template: template.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(response: &str, reason: impl Into<String>) -> Self {
        LabError::Parse {
            response: response.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type LabResult<T> = std::result::Result<T, LabError>;
