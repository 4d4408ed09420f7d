//! Tuning Advisor
//!
//! Turns a [`pattern_analyzer::PatternAnalysis`] into a single tuning
//! adjustment with a confidence, clamped to configured safety limits.

mod adjustment;
mod engine;

pub use adjustment::{Category, TuningAdjustment, TuningReport, Urgency};
pub use engine::{AdvisorConfig, RecommendationEngine, SafetyLimits};
