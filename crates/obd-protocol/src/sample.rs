//! Sample schema
//!
//! One decoded poll cycle. Values live in fixed slots keyed by [`Parameter`];
//! an empty slot means the parameter was not decoded this cycle.

use crate::catalog::{boost_psi, Parameter};
use serde::{Deserialize, Serialize};

/// A complete poll cycle of decoded measurements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp (Unix ms), stamped when the cycle is finalized
    pub timestamp_ms: u64,
    values: [Option<f64>; Parameter::COUNT],
}

impl Sample {
    /// Create an empty sample with the given timestamp
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// Value for a parameter, if present
    pub fn get(&self, parameter: Parameter) -> Option<f64> {
        self.values[parameter.index()]
    }

    /// Store a value; non-finite numbers are rejected and leave the slot empty
    pub fn set(&mut self, parameter: Parameter, value: f64) {
        self.values[parameter.index()] = value.is_finite().then_some(value);
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, parameter: Parameter, value: f64) -> Self {
        self.set(parameter, value);
        self
    }

    /// Clear a slot
    pub fn remove(&mut self, parameter: Parameter) {
        self.values[parameter.index()] = None;
    }

    /// Number of present values
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// True when no parameter was decoded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Present values in schema order
    pub fn iter(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        Parameter::ALL
            .iter()
            .zip(self.values.iter())
            .filter_map(|(p, v)| v.map(|v| (*p, v)))
    }

    /// Fill derived slots from their sources (boost from intake pressure)
    pub fn derive(&mut self) {
        if let Some(kpa) = self.get(Parameter::IntakePressure) {
            self.set(Parameter::BoostPressure, boost_psi(kpa));
        }
    }
}

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_by_default() {
        let sample = Sample::new(42);
        assert!(sample.is_empty());
        assert_eq!(sample.get(Parameter::Rpm), None);
    }

    #[test]
    fn test_non_finite_values_are_not_stored() {
        let mut sample = Sample::new(0);
        sample.set(Parameter::Rpm, f64::NAN);
        sample.set(Parameter::Speed, f64::INFINITY);
        assert!(sample.is_empty());
    }

    #[test]
    fn test_derive_boost() {
        let mut sample = Sample::new(0).with(Parameter::IntakePressure, 101.3);
        sample.derive();
        assert!(sample.get(Parameter::BoostPressure).unwrap().abs() < 1e-9);
        assert_eq!(sample.len(), 2);
    }

    #[test]
    fn test_iter_in_schema_order() {
        let sample = Sample::new(0)
            .with(Parameter::Speed, 60.0)
            .with(Parameter::Rpm, 2000.0);
        let keys: Vec<_> = sample.iter().map(|(p, _)| p).collect();
        assert_eq!(keys, vec![Parameter::Rpm, Parameter::Speed]);
    }
}
