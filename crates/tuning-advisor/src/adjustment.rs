//! Recommendation types

use pattern_analyzer::{DrivingStyle, PatternAnalysis};
use serde::Serialize;
use std::fmt;

/// Which driving pattern triggered an adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Performance,
    Efficiency,
    Balanced,
    Adaptive,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Performance => "performance",
            Category::Efficiency => "efficiency",
            Category::Balanced => "balanced",
            Category::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How soon the adjustment is worth applying
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Derived from the score that selected the category
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Urgency::High
        } else if score >= 0.7 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

/// A suggested calibration change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningAdjustment {
    /// Calibration table or scalar, e.g. `cruise_afr_target`
    pub parameter: String,
    pub current_value: f64,
    pub recommended_value: f64,
    /// 0 to 1, capped per category
    pub confidence: f64,
    pub category: Category,
    pub urgency: Urgency,
    pub rationale: String,
    pub timestamp_ms: u64,
}

impl TuningAdjustment {
    pub fn delta(&self) -> f64 {
        self.recommended_value - self.current_value
    }
}

/// Everything the advisor has to say about one analysis
#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub style: DrivingStyle,
    pub analysis: PatternAnalysis,
    pub adjustment: Option<TuningAdjustment>,
    pub insights: Vec<String>,
}
