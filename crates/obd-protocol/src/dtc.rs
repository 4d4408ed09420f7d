//! Diagnostic Trouble Codes
//!
//! Mode 03 response parsing, mode 04 acknowledgement and a small table of
//! well-known codes.

use crate::decoder::clean_lines;
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mode 03 positive response marker
pub const READ_DTC_MARKER: &str = "43";

/// Mode 04 positive response marker
pub const CLEAR_DTC_MARKER: &str = "44";

/// Codes that indicate immediate risk to the engine
pub const CRITICAL_CODES: [&str; 3] = ["P0234", "P0087", "P0300"];

/// DTC domain, selected by the top two bits of the first nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DtcCategory {
    Powertrain,
    Chassis,
    Body,
    Network,
}

impl DtcCategory {
    /// Letter prefix of the printed code
    pub fn letter(self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn from_index(index: u8) -> Self {
        match index {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    fn index(self) -> u8 {
        match self {
            DtcCategory::Powertrain => 0,
            DtcCategory::Chassis => 1,
            DtcCategory::Body => 2,
            DtcCategory::Network => 3,
        }
    }
}

/// A decoded diagnostic trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dtc {
    pub category: DtcCategory,
    /// Code space within the category (0-3)
    pub code_space: u8,
    /// Remaining three hex digits
    pub body: u16,
}

impl Dtc {
    /// Decode a 4-hex-digit group; `None` if it is not exactly 4 hex digits
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 4 {
            return None;
        }
        let raw = u16::from_str_radix(hex, 16).ok()?;
        let nibble = (raw >> 12) as u8;
        Some(Self {
            category: DtcCategory::from_index(nibble / 4),
            code_space: nibble % 4,
            body: raw & 0x0FFF,
        })
    }

    /// Re-encode to the 4-hex-digit wire form
    pub fn to_hex(&self) -> String {
        let nibble = self.category.index() * 4 + self.code_space;
        format!("{:X}{:03X}", nibble, self.body)
    }

    /// Human-readable description for well-known codes
    pub fn description(&self) -> Option<&'static str> {
        let code = self.to_string();
        let description = match code.as_str() {
            "P0087" => "Fuel Rail/System Pressure Too Low",
            "P0101" => "MAF Sensor Circuit Range/Performance",
            "P0234" => "Turbocharger Overboost Condition",
            "P0300" => "Random/Multiple Cylinder Misfire Detected",
            "P0420" => "Catalyst System Efficiency Below Threshold",
            _ => return None,
        };
        Some(description)
    }

    /// Whether this code warrants immediate attention
    pub fn is_critical(&self) -> bool {
        let code = self.to_string();
        CRITICAL_CODES.contains(&code.as_str())
    }
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:03X}", self.category.letter(), self.code_space, self.body)
    }
}

/// Decode a single 4-hex-digit code
pub fn hex_to_dtc(hex: &str) -> Option<Dtc> {
    Dtc::from_hex(hex)
}

/// Drop an 11-bit CAN header and length byte ("7E8 06 ...") when headers are on
fn strip_can_header(line: &str) -> &str {
    if line.len() > 5 && line.starts_with("7E") {
        &line[5..]
    } else {
        line
    }
}

/// Parse a mode 03 response into trouble codes.
///
/// Every line must start with `43` once any CAN header is removed. Groups shorter than 4 digits and `0000`
/// padding are skipped. `NO DATA` means no stored codes.
pub fn parse_dtc_response(raw: &str) -> Result<Vec<Dtc>, DecodeError> {
    let lines = clean_lines(raw);
    if lines.iter().any(|line| line == "NODATA") {
        return Ok(Vec::new());
    }

    let payloads: Vec<&str> = lines
        .iter()
        .filter_map(|line| strip_can_header(line).strip_prefix(READ_DTC_MARKER))
        .collect();
    if payloads.is_empty() {
        return Err(DecodeError::MissingMarker {
            marker: READ_DTC_MARKER,
            response: raw.trim().to_string(),
        });
    }

    let codes = payloads
        .iter()
        .flat_map(|payload| {
            payload
                .as_bytes()
                .chunks(4)
                .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                .filter(|group| *group != "0000")
                .filter_map(Dtc::from_hex)
                .collect::<Vec<_>>()
        })
        .collect();
    Ok(codes)
}

/// Whether a mode 04 response acknowledges the clear
pub fn is_clear_acknowledged(raw: &str) -> bool {
    clean_lines(raw)
        .iter()
        .any(|line| strip_can_header(line).starts_with(CLEAR_DTC_MARKER) || line.contains("OK"))
}
