//! Error handling for the telemetry agent

use gridlink_meter::MeterError;
use thiserror::Error;

/// Telemetry agent error type
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Credential store errors
    #[error("Store error: {0}")]
    StoreError(String),

    /// Network link management errors
    #[error("Link error: {0}")]
    LinkError(String),

    /// Collector upload errors (transport level)
    #[error("Upload error: {0}")]
    UploadError(String),

    /// Meter bus errors
    #[error("Meter error: {0}")]
    Meter(#[from] MeterError),

    /// The meter bus is held by an in-flight cycle
    #[error("Busy: {0}")]
    BusyError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type alias for the telemetry agent
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::ConfigError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        AgentError::StoreError(msg.into())
    }

    pub fn link(msg: impl Into<String>) -> Self {
        AgentError::LinkError(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        AgentError::UploadError(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        AgentError::BusyError(msg.into())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}
