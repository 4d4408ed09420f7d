//! Validation Error Types

use obd_protocol::Parameter;
use thiserror::Error;

/// Reasons a decoded value is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value outside the plausible physical range
    #[error("{parameter} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        parameter: Parameter,
        value: f64,
        min: f64,
        max: f64,
    },

    /// NaN or infinite value
    #[error("{0} value is not a finite number")]
    NonFinite(Parameter),
}
