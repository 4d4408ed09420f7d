//! Session Error Types

use obd_protocol::{DecodeError, ObdError};
use safety_monitor::RuleError;
use telemetry_pipeline::PipelineError;
use thiserror::Error;

/// Errors surfaced by the upward interface
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid safety configuration: {0}")]
    InvalidSafetyConfig(#[from] RuleError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Obd(#[from] ObdError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The adapter did not acknowledge a trouble code clear
    #[error("Trouble codes were not cleared: {0:?}")]
    ClearRejected(String),
}

impl From<DecodeError> for SessionError {
    fn from(err: DecodeError) -> Self {
        SessionError::Obd(ObdError::Decode(err))
    }
}
