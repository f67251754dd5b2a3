use tracing::warn;

use crate::constants::ERROR_QUEUE_LIMIT;
use crate::error::{DeviceError, LabError, LabResult};
use crate::interface::Adapter;

/// Reads and clears the device's own error report.
///
/// Installed on an [`crate::Instrument`] to back the `check_set_errors` and
/// `check_get_errors` property flags. Each driver decides what its codes mean.
pub trait ErrorCheck: Send {
    fn check_errors(&mut self, adapter: &mut dyn Adapter) -> LabResult<Vec<DeviceError>>;
}

/// SCPI error queue: `SYST:ERR?` is read until it reports code 0.
#[derive(Debug, Clone)]
pub struct ScpiErrorQueue {
    command: String,
    limit: usize,
}

impl Default for ScpiErrorQueue {
    fn default() -> Self {
        ScpiErrorQueue {
            command: "SYST:ERR?".to_string(),
            limit: ERROR_QUEUE_LIMIT,
        }
    }
}

impl ScpiErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different query, e.g. `:SYSTem:ERRor:NEXT?`
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}

/// Parses `-113,"Undefined header"` style replies.
pub fn parse_scpi_error(reply: &str) -> LabResult<DeviceError> {
    let reply = reply.trim();
    let (code, message) = reply.split_once(',').unwrap_or((reply, ""));
    let code = code
        .trim()
        .parse::<i64>()
        .map_err(|e| LabError::parse(reply, e.to_string()))?;
    Ok(DeviceError {
        code,
        message: message.trim().trim_matches('"').to_string(),
    })
}

impl ErrorCheck for ScpiErrorQueue {
    fn check_errors(&mut self, adapter: &mut dyn Adapter) -> LabResult<Vec<DeviceError>> {
        let mut errors = Vec::new();
        for _ in 0..self.limit {
            let entry = parse_scpi_error(&adapter.ask(&self.command)?)?;
            if entry.code == 0 {
                return Ok(errors);
            }
            warn!("Device error {}", entry);
            errors.push(entry);
        }
        warn!(
            "Error queue still not empty after {} reads",
            self.limit
        );
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::mock::MockAdapter;

    #[test]
    fn parses_scpi_error_replies() {
        assert_eq!(
            parse_scpi_error("-222,\"Data out of range\"").unwrap(),
            DeviceError {
                code: -222,
                message: "Data out of range".to_string()
            }
        );
        assert_eq!(parse_scpi_error("+0,\"No error\"\n").unwrap().code, 0);
        assert_eq!(parse_scpi_error("0").unwrap().message, "");
        assert!(parse_scpi_error("none").is_err());
    }

    #[test]
    fn queue_is_drained_until_no_error() {
        let mut adapter = MockAdapter::new()
            .expect_ask("SYST:ERR?", "-113,\"Undefined header\"")
            .expect_ask("SYST:ERR?", "-222,\"Data out of range\"")
            .expect_ask("SYST:ERR?", "0,\"No error\"");
        let errors = ScpiErrorQueue::new().check_errors(&mut adapter).unwrap();
        assert_eq!(
            errors.iter().map(|e| e.code).collect::<Vec<_>>(),
            vec![-113, -222]
        );
        assert_eq!(adapter.remaining(), 0);
    }
}
