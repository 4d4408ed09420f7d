//! Driving style scoring

use crate::analyzer::PatternAnalysis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall driving style label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivingStyle {
    PerformanceEnthusiast,
    EfficiencyFocused,
    BalancedAllRounder,
    #[default]
    AdaptiveDriver,
}

impl DrivingStyle {
    pub fn label(self) -> &'static str {
        match self {
            DrivingStyle::PerformanceEnthusiast => "Performance Enthusiast",
            DrivingStyle::EfficiencyFocused => "Efficiency Focused",
            DrivingStyle::BalancedAllRounder => "Balanced All-Rounder",
            DrivingStyle::AdaptiveDriver => "Adaptive Driver",
        }
    }
}

impl fmt::Display for DrivingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Maps window metrics to a style. Swap in a learned model by implementing this.
pub trait StyleScorer: Send + Sync {
    /// `analysis.style` is not yet set when this is called
    fn style(&self, analysis: &PatternAnalysis) -> DrivingStyle;
}

/// Threshold-based scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultStyleScorer {
    pub performance_threshold: f64,
    pub efficiency_threshold: f64,
    pub balanced_threshold: f64,
}

impl Default for DefaultStyleScorer {
    fn default() -> Self {
        Self {
            performance_threshold: 0.7,
            efficiency_threshold: 0.7,
            balanced_threshold: 0.6,
        }
    }
}

impl StyleScorer for DefaultStyleScorer {
    fn style(&self, analysis: &PatternAnalysis) -> DrivingStyle {
        if analysis.aggression > self.performance_threshold {
            DrivingStyle::PerformanceEnthusiast
        } else if analysis.efficiency > self.efficiency_threshold {
            DrivingStyle::EfficiencyFocused
        } else if analysis.aggression > self.balanced_threshold
            && analysis.efficiency > self.balanced_threshold
        {
            DrivingStyle::BalancedAllRounder
        } else {
            DrivingStyle::AdaptiveDriver
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(aggression: f64, efficiency: f64) -> DrivingStyle {
        let analysis = PatternAnalysis {
            aggression,
            efficiency,
            ..PatternAnalysis::default()
        };
        DefaultStyleScorer::default().style(&analysis)
    }

    #[test]
    fn test_style_priority() {
        assert_eq!(scored(0.8, 0.9), DrivingStyle::PerformanceEnthusiast);
        assert_eq!(scored(0.2, 0.8), DrivingStyle::EfficiencyFocused);
        assert_eq!(scored(0.65, 0.65), DrivingStyle::BalancedAllRounder);
        assert_eq!(scored(0.3, 0.3), DrivingStyle::AdaptiveDriver);
    }
}
