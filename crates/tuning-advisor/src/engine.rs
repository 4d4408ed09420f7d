//! Recommendation Engine

use crate::adjustment::{Category, TuningAdjustment, TuningReport, Urgency};
use pattern_analyzer::PatternAnalysis;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hard ceilings on what the engine may recommend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Mid-range load target (g/rev)
    pub max_load_target: f64,
    /// Leanest cruise air/fuel ratio
    pub max_cruise_afr: f64,
    pub max_throttle_gain: f64,
    /// Largest timing change either way (degrees)
    pub max_timing_delta: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_load_target: 2.2,
            max_cruise_afr: 15.0,
            max_throttle_gain: 1.2,
            max_timing_delta: 2.0,
        }
    }
}

/// Recommendation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Analyses covering fewer samples are ignored
    pub min_samples: usize,
    pub limits: SafetyLimits,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            limits: SafetyLimits::default(),
        }
    }
}

/// One recommendation branch: which knob to turn and how far
struct Plan {
    category: Category,
    parameter: &'static str,
    baseline: f64,
    /// Added to the baseline per unit of `scale`
    gain: f64,
    scale: f64,
    /// Score that selected the branch, also the raw confidence
    trigger: f64,
    ceiling: f64,
    summary: &'static str,
}

/// Maps driving patterns to calibration changes
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    config: AdvisorConfig,
}

impl RecommendationEngine {
    pub fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// First matching branch wins: performance, efficiency, balanced, adaptive
    pub fn recommend(&self, analysis: &PatternAnalysis) -> Option<TuningAdjustment> {
        if analysis.sample_count < self.config.min_samples {
            debug!(
                "Skipping recommendation: {} of {} samples",
                analysis.sample_count, self.config.min_samples
            );
            return None;
        }

        let plan = Self::plan(analysis);
        let unclamped = plan.baseline + plan.gain * plan.scale;
        let recommended = self.clamp(plan.category, plan.baseline, unclamped);
        let confidence = plan.trigger.clamp(0.0, plan.ceiling);

        let mut rationale = format!(
            "{} (aggression {:.0}%, efficiency {:.0}%, typical rpm {:.0}-{:.0})",
            plan.summary,
            analysis.aggression * 100.0,
            analysis.efficiency * 100.0,
            analysis.typical_rpm_range.0,
            analysis.typical_rpm_range.1,
        );
        if recommended != unclamped {
            rationale.push_str(&format!(
                "; limited from {unclamped:.2} to {recommended:.2} by safety limits"
            ));
        }

        let adjustment = TuningAdjustment {
            parameter: plan.parameter.to_string(),
            current_value: plan.baseline,
            recommended_value: recommended,
            confidence,
            category: plan.category,
            urgency: Urgency::from_score(plan.trigger),
            rationale,
            timestamp_ms: analysis.timestamp_ms,
        };
        info!(
            "Recommend {} {:.2} -> {:.2} ({}, confidence {:.2})",
            adjustment.parameter,
            adjustment.current_value,
            adjustment.recommended_value,
            adjustment.category,
            adjustment.confidence
        );
        Some(adjustment)
    }

    /// Style, adjustment and plain-language notes for one analysis
    pub fn report(&self, analysis: &PatternAnalysis) -> TuningReport {
        TuningReport {
            style: analysis.style,
            analysis: analysis.clone(),
            adjustment: self.recommend(analysis),
            insights: Self::insights(analysis),
        }
    }

    fn plan(analysis: &PatternAnalysis) -> Plan {
        let aggression = analysis.aggression;
        let efficiency = analysis.efficiency;
        let mean = (aggression + efficiency) / 2.0;

        if aggression > 0.7 {
            Plan {
                category: Category::Performance,
                parameter: "load_target_midrange",
                baseline: 1.8,
                gain: 0.3,
                scale: aggression,
                trigger: aggression,
                ceiling: 0.9,
                summary: "Raise mid-range load targets for stronger 3000-5000 rpm response",
            }
        } else if efficiency > 0.7 {
            Plan {
                category: Category::Efficiency,
                parameter: "cruise_afr_target",
                baseline: 14.7,
                gain: 0.3,
                scale: efficiency,
                trigger: efficiency,
                ceiling: 0.85,
                summary: "Lean the cruise mixture for better fuel economy",
            }
        } else if aggression > 0.6 && efficiency > 0.6 {
            Plan {
                category: Category::Balanced,
                parameter: "throttle_response_gain",
                baseline: 1.0,
                gain: 0.1,
                scale: mean,
                trigger: mean,
                ceiling: 0.75,
                summary: "Sharpen throttle response while keeping cruise calibration",
            }
        } else {
            Plan {
                category: Category::Adaptive,
                parameter: "timing_advance_midrange",
                baseline: 0.0,
                gain: 0.5,
                scale: efficiency,
                trigger: mean,
                ceiling: 0.5,
                summary: "Small mid-range timing change while the driving pattern settles",
            }
        }
    }

    fn clamp(&self, category: Category, baseline: f64, value: f64) -> f64 {
        let limits = &self.config.limits;
        match category {
            Category::Performance => value.min(limits.max_load_target),
            Category::Efficiency => value.min(limits.max_cruise_afr),
            Category::Balanced => value.min(limits.max_throttle_gain),
            Category::Adaptive => {
                baseline + (value - baseline).clamp(-limits.max_timing_delta, limits.max_timing_delta)
            }
        }
    }

    fn insights(analysis: &PatternAnalysis) -> Vec<String> {
        let mut insights = Vec::new();
        if analysis.aggression > 0.7 {
            insights.push("Load-based targets keep performance consistent across conditions".to_string());
            insights.push("Watch intake temperature during extended spirited driving".to_string());
        }
        if analysis.efficiency > 0.7 {
            insights.push("Conservative boost use extends turbocharger life".to_string());
            insights.push("Most time is spent in the efficient 1500-3000 rpm band".to_string());
        }
        if analysis.throttle_usage.heavy > 0.5 {
            insights.push(format!(
                "Heavy throttle ({:.0}% of readings) dominates this window",
                analysis.throttle_usage.heavy * 100.0
            ));
        }
        if let Some(context) = analysis.dominant_context() {
            insights.push(format!("Mostly {}", context.as_str().replace('_', " ")));
        }
        insights
    }
}
