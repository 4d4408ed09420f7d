//! Data Validator for Range Checking

use crate::error::ValidationError;
use obd_protocol::{Parameter, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Plausible boost range (PSI gauge); boost has no catalog entry
    pub boost_range: (f64, f64),
    /// Per-parameter ranges replacing the catalog's
    pub overrides: BTreeMap<Parameter, (f64, f64)>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        // Encodable rpm goes far beyond any road engine
        overrides.insert(Parameter::Rpm, (0.0, 10000.0));
        Self {
            boost_range: (-14.7, 50.0),
            overrides,
        }
    }
}

/// Result of validating one sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    /// Values that were removed from the sample
    pub errors: Vec<ValidationError>,
    /// Number of values checked
    pub fields_checked: usize,
}

impl ValidationResult {
    /// Whether every value passed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Plausibility checker for decoded values
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Plausible range for a parameter
    pub fn range(&self, parameter: Parameter) -> Option<(f64, f64)> {
        if let Some(range) = self.config.overrides.get(&parameter) {
            return Some(*range);
        }
        match parameter.definition() {
            Some(definition) => Some(definition.range),
            None if parameter == Parameter::BoostPressure => Some(self.config.boost_range),
            None => None,
        }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        parameter: Parameter,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite(parameter));
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                parameter,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a value against the parameter's plausible range
    pub fn validate(&self, parameter: Parameter, value: f64) -> Result<(), ValidationError> {
        match self.range(parameter) {
            Some(range) => self.validate_range(parameter, value, range),
            None if value.is_finite() => Ok(()),
            None => Err(ValidationError::NonFinite(parameter)),
        }
    }

    /// Remove implausible values from a sample in place
    pub fn validate_sample(&self, sample: &mut Sample) -> ValidationResult {
        let mut result = ValidationResult::default();
        let present: Vec<(Parameter, f64)> = sample.iter().collect();
        for (parameter, value) in present {
            result.fields_checked += 1;
            if let Err(err) = self.validate(parameter, value) {
                debug!("Dropping implausible value: {}", err);
                sample.remove(parameter);
                result.errors.push(err);
            }
        }
        result
    }
}
