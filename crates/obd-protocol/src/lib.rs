//! OBD-II Protocol Implementation
//!
//! Async command/response communication with ELM327-compatible adapters over
//! serial, Bluetooth RFCOMM or an in-process emulator, plus the parameter
//! catalog, response decoding and trouble-code parsing built on top of it.

pub mod catalog;
mod channel;
mod decoder;
mod dtc;
mod error;
pub mod mock;
mod protocol;
mod sample;
pub mod transport;

pub use catalog::{Parameter, ParameterDefinition};
pub use channel::{
    connect, initialize_stream, CommandChannel, RawTrace, SharedChannel, DEFAULT_TIMEOUT_MS,
    POLL_TIMEOUT_MS, TRACE_CAPACITY,
};
pub use decoder::{clean_lines, decode, decode_command, PROMPT};
pub use dtc::{hex_to_dtc, is_clear_acknowledged, parse_dtc_response, Dtc, DtcCategory, CRITICAL_CODES};
pub use error::{DecodeError, ObdError};
pub use protocol::ObdProtocol;
pub use sample::{now_ms, Sample};
pub use transport::{TransportConfig, ADAPTER_KEYWORDS};

/// OBD-II mode request prefixes
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: &str = "01";
    /// Diagnostic trouble codes
    pub const READ_DTC: &str = "03";
    /// Clear trouble codes
    pub const CLEAR_DTC: &str = "04";
    /// Manufacturer-specific local identifiers
    pub const MANUFACTURER_LOCAL: &str = "21";
    /// Manufacturer-specific data by identifier
    pub const MANUFACTURER_DATA: &str = "22";
}
