//! Connection status reported to the upward interface

use serde::Serialize;
use std::fmt;

/// Health of the adapter link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    /// Several consecutive cycles produced no data
    Degraded,
    /// The link is gone; the reason is the underlying error
    Failed(String),
}

impl ConnectionStatus {
    /// One human-readable status line
    pub fn message(&self) -> String {
        match self {
            ConnectionStatus::Disconnected => "Not connected".to_string(),
            ConnectionStatus::Connected => "Connected".to_string(),
            ConnectionStatus::Degraded => "Connected, but the vehicle is not responding".to_string(),
            ConnectionStatus::Failed(reason) => format!("Connection failed: {}", reason),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Degraded)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
