//! Response Decoder
//!
//! Turns raw adapter text into numeric values using the parameter catalog.

use crate::catalog::{self, ParameterDefinition};
use crate::error::DecodeError;

/// Adapter prompt terminator
pub const PROMPT: char = '>';

/// Split a raw response into upper-cased lines with whitespace removed,
/// dropping blank lines and `SEARCHING...` banners
pub fn clean_lines(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == '\r' || c == '\n')
        .map(|line| {
            line.chars()
                .filter(|c| !c.is_whitespace() && *c != PROMPT)
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|line| !line.is_empty() && !line.starts_with("SEARCHING"))
        .collect()
}

/// The last line consisting only of hex digits
fn payload_line(raw: &str) -> Result<String, DecodeError> {
    clean_lines(raw)
        .into_iter()
        .rev()
        .find(|line| line.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| DecodeError::MalformedResponse(raw.trim().to_string()))
}

/// Positive response marker for a mode 01 command ("010C" -> "410C")
fn mode01_marker(command: &str) -> Option<String> {
    command
        .strip_prefix("01")
        .map(|pid| format!("41{}", pid.to_ascii_uppercase()))
}

/// Decode a raw response for a catalogued parameter
pub fn decode(definition: &ParameterDefinition, raw: &str) -> Result<f64, DecodeError> {
    let hex = payload_line(raw)?;
    if hex.len() < definition.min_payload_chars() {
        return Err(DecodeError::MalformedResponse(raw.trim().to_string()));
    }

    let data_chars = 2 * definition.response_bytes;
    let data_start = hex.len() - data_chars;

    // Headers may precede the marker, so only the bytes right before the data are checked
    if let Some(marker) = mode01_marker(definition.command) {
        if hex[data_start - 4..data_start] != marker {
            return Err(DecodeError::MissingMarker {
                marker: "41",
                response: raw.trim().to_string(),
            });
        }
    }

    let field = u32::from_str_radix(&hex[data_start..], 16)
        .map_err(|_| DecodeError::MalformedResponse(raw.trim().to_string()))?;
    Ok((definition.decode)(field))
}

/// Decode a raw response by adapter command code
pub fn decode_command(command: &str, raw: &str) -> Result<f64, DecodeError> {
    let definition =
        catalog::by_command(command).ok_or_else(|| DecodeError::UnknownCommand(command.to_string()))?;
    decode(definition, raw)
}
