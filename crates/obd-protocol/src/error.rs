//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Device open/read/write failure; fatal to the session
    #[error("Transport error: {0}")]
    Transport(String),

    /// No prompt terminator seen within the read window
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// The adapter rejected a step of the startup sequence
    #[error("Adapter initialization failed at {command}: {reason}")]
    InitializationFailed { command: String, reason: String },

    /// Channel closed or never opened
    #[error("OBD adapter not connected")]
    NotConnected,

    /// No adapter matched during device discovery
    #[error("No OBD adapter found matching {0:?}")]
    AdapterNotFound(Vec<String>),

    /// Response could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ObdError {
    /// Whether this error ends the session (as opposed to a per-request failure)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ObdError::Transport(_) | ObdError::NotConnected | ObdError::InitializationFailed { .. }
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

/// Errors produced while turning raw adapter text into values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload too short, not hex, or an adapter status message
    #[error("Malformed response: {0:?}")]
    MalformedResponse(String),

    /// Expected response marker (e.g. `43` for mode 03) is missing
    #[error("Response does not start with marker {marker}: {response:?}")]
    MissingMarker { marker: &'static str, response: String },

    /// Command code not present in the parameter catalog
    #[error("Unknown parameter command {0}")]
    UnknownCommand(String),
}
