//! Parameter Catalog
//!
//! Static table mapping adapter command codes to decode rules, units and
//! plausible ranges. Standard mode 01 PIDs plus the manufacturer-specific
//! mode 21/22 identifiers used for turbo diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard atmosphere in kPa, used to turn manifold pressure into boost
pub const ATMOSPHERIC_KPA: f64 = 101.3;

/// kPa to PSI conversion factor
pub const KPA_TO_PSI: f64 = 0.145038;

/// Stoichiometric AFR for gasoline, used to scale commanded lambda
pub const STOICH_AFR: f64 = 14.7;

/// Every quantity a [`Sample`](crate::Sample) can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Rpm,
    Speed,
    EngineLoad,
    CoolantTemp,
    IntakePressure,
    IntakeTemp,
    ThrottlePosition,
    MafFlow,
    TimingAdvance,
    CommandedAfr,
    ShortFuelTrim,
    LongFuelTrim,
    KnockRetard,
    WastegateDuty,
    FuelPressure,
    VvtAngle,
    /// Derived from intake pressure, never requested directly
    BoostPressure,
}

impl Parameter {
    /// Number of parameters (size of the sample schema)
    pub const COUNT: usize = 17;

    /// All parameters in schema order
    pub const ALL: [Parameter; Parameter::COUNT] = [
        Parameter::Rpm,
        Parameter::Speed,
        Parameter::EngineLoad,
        Parameter::CoolantTemp,
        Parameter::IntakePressure,
        Parameter::IntakeTemp,
        Parameter::ThrottlePosition,
        Parameter::MafFlow,
        Parameter::TimingAdvance,
        Parameter::CommandedAfr,
        Parameter::ShortFuelTrim,
        Parameter::LongFuelTrim,
        Parameter::KnockRetard,
        Parameter::WastegateDuty,
        Parameter::FuelPressure,
        Parameter::VvtAngle,
        Parameter::BoostPressure,
    ];

    /// Slot index in the sample schema
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable snake_case key, matching the serde representation
    pub fn key(self) -> &'static str {
        match self {
            Parameter::Rpm => "rpm",
            Parameter::Speed => "speed",
            Parameter::EngineLoad => "engine_load",
            Parameter::CoolantTemp => "coolant_temp",
            Parameter::IntakePressure => "intake_pressure",
            Parameter::IntakeTemp => "intake_temp",
            Parameter::ThrottlePosition => "throttle_position",
            Parameter::MafFlow => "maf_flow",
            Parameter::TimingAdvance => "timing_advance",
            Parameter::CommandedAfr => "commanded_afr",
            Parameter::ShortFuelTrim => "short_fuel_trim",
            Parameter::LongFuelTrim => "long_fuel_trim",
            Parameter::KnockRetard => "knock_retard",
            Parameter::WastegateDuty => "wastegate_duty",
            Parameter::FuelPressure => "fuel_pressure",
            Parameter::VvtAngle => "vvt_angle",
            Parameter::BoostPressure => "boost_pressure",
        }
    }

    /// Catalog entry, `None` for derived parameters
    pub fn definition(self) -> Option<&'static ParameterDefinition> {
        CATALOG.iter().find(|def| def.parameter == self)
    }

    /// Whether the value is computed from other parameters
    pub fn is_derived(self) -> bool {
        matches!(self, Parameter::BoostPressure)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Decode rule and metadata for one requestable parameter
#[derive(Debug, Clone, Copy)]
pub struct ParameterDefinition {
    /// Schema slot this command fills
    pub parameter: Parameter,
    /// Adapter command, mode + PID (e.g. "010C")
    pub command: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Physical unit
    pub unit: &'static str,
    /// Number of data bytes expected in the response
    pub response_bytes: usize,
    /// Pure decode function from the raw data field
    pub decode: fn(u32) -> f64,
    /// Plausible physical range, inclusive
    pub range: (f64, f64),
}

impl ParameterDefinition {
    /// Minimum number of hex characters a response must carry
    pub fn min_payload_chars(&self) -> usize {
        4 + 2 * self.response_bytes
    }
}

fn percent(raw: u32) -> f64 {
    raw as f64 * 100.0 / 255.0
}

fn temperature(raw: u32) -> f64 {
    raw as f64 - 40.0
}

fn fuel_trim(raw: u32) -> f64 {
    (raw as f64 - 128.0) * 100.0 / 128.0
}

fn identity(raw: u32) -> f64 {
    raw as f64
}

fn rpm(raw: u32) -> f64 {
    raw as f64 / 4.0
}

fn timing_advance(raw: u32) -> f64 {
    raw as f64 / 2.0 - 64.0
}

fn maf(raw: u32) -> f64 {
    raw as f64 / 100.0
}

fn commanded_afr(raw: u32) -> f64 {
    raw as f64 / 32768.0 * STOICH_AFR
}

/// The static parameter table
pub static CATALOG: &[ParameterDefinition] = &[
    ParameterDefinition {
        parameter: Parameter::EngineLoad,
        command: "0104",
        name: "Engine Load",
        unit: "%",
        response_bytes: 1,
        decode: percent,
        range: (0.0, 100.0),
    },
    ParameterDefinition {
        parameter: Parameter::CoolantTemp,
        command: "0105",
        name: "Coolant Temp",
        unit: "°C",
        response_bytes: 1,
        decode: temperature,
        range: (-40.0, 215.0),
    },
    ParameterDefinition {
        parameter: Parameter::ShortFuelTrim,
        command: "0106",
        name: "Short Term Fuel Trim",
        unit: "%",
        response_bytes: 1,
        decode: fuel_trim,
        range: (-100.0, 99.3),
    },
    ParameterDefinition {
        parameter: Parameter::LongFuelTrim,
        command: "0107",
        name: "Long Term Fuel Trim",
        unit: "%",
        response_bytes: 1,
        decode: fuel_trim,
        range: (-100.0, 99.3),
    },
    ParameterDefinition {
        parameter: Parameter::IntakePressure,
        command: "010B",
        name: "Intake Pressure",
        unit: "kPa",
        response_bytes: 1,
        decode: identity,
        range: (0.0, 255.0),
    },
    ParameterDefinition {
        parameter: Parameter::Rpm,
        command: "010C",
        name: "Engine RPM",
        unit: "rpm",
        response_bytes: 2,
        decode: rpm,
        range: (0.0, 16383.75),
    },
    ParameterDefinition {
        parameter: Parameter::Speed,
        command: "010D",
        name: "Vehicle Speed",
        unit: "km/h",
        response_bytes: 1,
        decode: identity,
        range: (0.0, 255.0),
    },
    ParameterDefinition {
        parameter: Parameter::TimingAdvance,
        command: "010E",
        name: "Timing Advance",
        unit: "°",
        response_bytes: 1,
        decode: timing_advance,
        range: (-64.0, 63.5),
    },
    ParameterDefinition {
        parameter: Parameter::IntakeTemp,
        command: "010F",
        name: "Intake Temp",
        unit: "°C",
        response_bytes: 1,
        decode: temperature,
        range: (-40.0, 215.0),
    },
    ParameterDefinition {
        parameter: Parameter::MafFlow,
        command: "0110",
        name: "MAF Flow",
        unit: "g/s",
        response_bytes: 2,
        decode: maf,
        range: (0.0, 655.35),
    },
    ParameterDefinition {
        parameter: Parameter::ThrottlePosition,
        command: "0111",
        name: "Throttle Position",
        unit: "%",
        response_bytes: 1,
        decode: percent,
        range: (0.0, 100.0),
    },
    ParameterDefinition {
        parameter: Parameter::CommandedAfr,
        command: "0144",
        name: "Commanded AFR",
        unit: ":1",
        response_bytes: 2,
        decode: commanded_afr,
        range: (0.0, 29.4),
    },
    // Manufacturer-specific: raw last byte, no scaling
    ParameterDefinition {
        parameter: Parameter::KnockRetard,
        command: "2110",
        name: "Knock Retard",
        unit: "°",
        response_bytes: 1,
        decode: identity,
        range: (0.0, 255.0),
    },
    ParameterDefinition {
        parameter: Parameter::WastegateDuty,
        command: "2140",
        name: "Wastegate Duty",
        unit: "%",
        response_bytes: 1,
        decode: identity,
        range: (0.0, 255.0),
    },
    ParameterDefinition {
        parameter: Parameter::VvtAngle,
        command: "2210",
        name: "VVT Angle",
        unit: "°",
        response_bytes: 1,
        decode: identity,
        range: (0.0, 255.0),
    },
    ParameterDefinition {
        parameter: Parameter::FuelPressure,
        command: "2230",
        name: "Fuel Pressure",
        unit: "raw",
        response_bytes: 1,
        decode: identity,
        range: (0.0, 255.0),
    },
];

/// Look up a definition by adapter command (case-insensitive)
pub fn by_command(command: &str) -> Option<&'static ParameterDefinition> {
    CATALOG
        .iter()
        .find(|def| def.command.eq_ignore_ascii_case(command.trim()))
}

/// Default polling set: everything the safety monitor and analyzer consume
pub fn default_poll_set() -> Vec<Parameter> {
    vec![
        Parameter::Rpm,
        Parameter::Speed,
        Parameter::ThrottlePosition,
        Parameter::EngineLoad,
        Parameter::IntakePressure,
        Parameter::CoolantTemp,
        Parameter::IntakeTemp,
        Parameter::TimingAdvance,
        Parameter::MafFlow,
        Parameter::CommandedAfr,
    ]
}

/// Boost in PSI gauge from manifold absolute pressure in kPa
pub fn boost_psi(intake_kpa: f64) -> f64 {
    (intake_kpa - ATMOSPHERIC_KPA) * KPA_TO_PSI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_order_matches_index() {
        for (i, parameter) in Parameter::ALL.iter().enumerate() {
            assert_eq!(parameter.index(), i);
        }
    }

    #[test]
    fn test_every_requestable_parameter_has_definition() {
        for parameter in Parameter::ALL {
            assert_eq!(parameter.definition().is_none(), parameter.is_derived());
        }
    }

    #[test]
    fn test_lookup_by_command() {
        let def = by_command("010c").unwrap();
        assert_eq!(def.parameter, Parameter::Rpm);
        assert_eq!(def.min_payload_chars(), 8);
        assert!(by_command("01FF").is_none());
    }

    #[test]
    fn test_decode_rules() {
        assert!(((Parameter::CoolantTemp.definition().unwrap().decode)(0x5A) - 50.0).abs() < 1e-9);
        assert!(((Parameter::TimingAdvance.definition().unwrap().decode)(0x90) - 8.0).abs() < 1e-9);
        assert!(((Parameter::ThrottlePosition.definition().unwrap().decode)(255) - 100.0).abs() < 1e-9);
        assert!(((Parameter::CommandedAfr.definition().unwrap().decode)(0x8000) - 14.7).abs() < 1e-9);
    }

    #[test]
    fn test_boost_conversion() {
        assert!(boost_psi(ATMOSPHERIC_KPA).abs() < 1e-9);
        // 200 kPa absolute is roughly 14.3 PSI of boost
        assert!((boost_psi(200.0) - 14.315).abs() < 0.01);
    }
}
