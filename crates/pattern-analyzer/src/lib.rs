//! Driving Pattern Analyzer
//!
//! Classifies each sample into a driving context and, over a sliding window,
//! scores how aggressive and how efficient the driving is.

mod analyzer;
mod context;
mod statistics;
mod style;

pub use analyzer::{
    AggressionBreakdown, AnalyzerConfig, ClassifiedSample, PatternAnalysis, PatternAnalyzer,
    ThrottleUsage,
};
pub use context::{ContextThresholds, DrivingContext};
pub use statistics::StatisticalFeatures;
pub use style::{DefaultStyleScorer, DrivingStyle, StyleScorer};
