//! Error handling for the meter protocol library

use thiserror::Error;

/// Meter protocol error type
#[derive(Error, Debug, Clone)]
pub enum MeterError {
    /// Configuration-related errors (bad serial parameters, invalid request)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Protocol errors (framing, CRC, length, station id mismatch)
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Operation timeout errors
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Modbus exception response from the meter
    #[error("Modbus exception 0x{0:02X}: {}", exception_description(*.0))]
    Exception(u8),
}

/// Result type alias for the meter protocol library
pub type Result<T> = std::result::Result<T, MeterError>;

impl MeterError {
    pub fn config(msg: impl Into<String>) -> Self {
        MeterError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        MeterError::IoError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        MeterError::ProtocolError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        MeterError::TimeoutError(msg.into())
    }
}

/// Get exception description (Modbus standard exception codes)
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_display_includes_description() {
        let err = MeterError::Exception(0x02);
        let msg = err.to_string();
        assert!(msg.contains("0x02"));
        assert!(msg.contains("Illegal Data Address"));
    }

    #[test]
    fn test_unknown_exception_code() {
        assert_eq!(exception_description(0x7F), "Unknown Exception");
    }
}
