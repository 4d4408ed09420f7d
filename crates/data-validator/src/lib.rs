//! Data Validation and Smoothing
//!
//! Range checking against the parameter catalog and optional per-parameter
//! smoothing of decoded samples.

mod error;
mod filter;
mod smoother;
mod validator;

pub use error::ValidationError;
pub use filter::{Ewma, MedianFilter, MovingAverage};
pub use smoother::{Smoother, SmoothingMethod};
pub use validator::{ValidationConfig, ValidationResult, Validator};
