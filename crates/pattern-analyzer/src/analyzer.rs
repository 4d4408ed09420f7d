//! Windowed driving pattern analysis

use crate::context::{ContextThresholds, DrivingContext};
use crate::statistics::StatisticalFeatures;
use crate::style::{DefaultStyleScorer, DrivingStyle, StyleScorer};
use obd_protocol::{Parameter, Sample};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

const AGGRESSIVE_THROTTLE: f64 = 80.0;
const AGGRESSIVE_RPM: f64 = 5000.0;
const AGGRESSIVE_BOOST: f64 = 15.0;
const THROTTLE_WEIGHT: f64 = 0.4;
const RPM_WEIGHT: f64 = 0.4;
const BOOST_WEIGHT: f64 = 0.2;

const EFFICIENT_RPM: (f64, f64) = (1500.0, 3000.0);
const EFFICIENT_THROTTLE: f64 = 30.0;
const EFFICIENT_RPM_WEIGHT: f64 = 0.4;
const EFFICIENT_THROTTLE_WEIGHT: f64 = 0.3;
const CRUISING_WEIGHT: f64 = 0.3;

const LIGHT_THROTTLE: f64 = 30.0;
const HEAVY_THROTTLE: f64 = 70.0;

/// Analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Samples kept in the pattern window
    pub window_capacity: usize,
    /// Samples needed before any analysis runs
    pub min_samples: usize,
    /// Samples between automatic analyses
    pub analysis_interval: usize,
    pub thresholds: ContextThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_capacity: 150,
            min_samples: 50,
            analysis_interval: 100,
            thresholds: ContextThresholds::default(),
        }
    }
}

/// A windowed sample with its context
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSample {
    pub sample: Sample,
    pub context: DrivingContext,
}

/// Per-term share of the aggression score; the terms sum to the score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggressionBreakdown {
    pub throttle: f64,
    pub rpm: f64,
    pub boost: f64,
}

impl AggressionBreakdown {
    pub fn total(&self) -> f64 {
        self.throttle + self.rpm + self.boost
    }
}

/// Fractions of throttle readings in each band
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThrottleUsage {
    /// Below 30 %
    pub light: f64,
    /// 30 to 70 %
    pub medium: f64,
    /// Above 70 %
    pub heavy: f64,
}

/// Read-only snapshot of the pattern window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternAnalysis {
    /// Samples covered
    pub sample_count: usize,
    /// 0 (gentle) to 1 (flat out)
    pub aggression: f64,
    pub aggression_breakdown: AggressionBreakdown,
    /// 0 to 1
    pub efficiency: f64,
    pub rpm_mean: f64,
    pub rpm_std_dev: f64,
    /// Mean ± half a standard deviation
    pub typical_rpm_range: (f64, f64),
    pub throttle_usage: ThrottleUsage,
    /// Fraction of samples per context
    pub context_distribution: BTreeMap<DrivingContext, f64>,
    pub style: DrivingStyle,
    /// Timestamp of the newest sample covered
    pub timestamp_ms: u64,
}

impl PatternAnalysis {
    /// Most frequent context, if any samples were covered
    pub fn dominant_context(&self) -> Option<DrivingContext> {
        self.context_distribution
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(context, _)| *context)
    }
}

/// Owns the pattern window and produces analyses
pub struct PatternAnalyzer {
    config: AnalyzerConfig,
    window: RingBuffer<ClassifiedSample>,
    since_last_analysis: usize,
    latest: Option<PatternAnalysis>,
    scorer: Box<dyn StyleScorer>,
}

impl std::fmt::Debug for PatternAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternAnalyzer")
            .field("config", &self.config)
            .field("windowed", &self.window.len())
            .field("since_last_analysis", &self.since_last_analysis)
            .finish()
    }
}

impl PatternAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let window = RingBuffer::new(config.window_capacity);
        Self {
            config,
            window,
            since_last_analysis: 0,
            latest: None,
            scorer: Box::new(DefaultStyleScorer::default()),
        }
    }

    /// Replace the style model
    pub fn with_scorer(mut self, scorer: Box<dyn StyleScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn classify(&self, sample: &Sample) -> DrivingContext {
        self.config.thresholds.classify(sample)
    }

    /// Samples currently windowed
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Most recent analysis
    pub fn latest_analysis(&self) -> Option<&PatternAnalysis> {
        self.latest.as_ref()
    }

    /// Window a sample; returns a fresh analysis when one is due
    pub fn ingest(&mut self, sample: &Sample) -> Option<PatternAnalysis> {
        let context = self.classify(sample);
        self.window.push(ClassifiedSample {
            sample: sample.clone(),
            context,
        });
        self.since_last_analysis += 1;

        if self.window.len() < self.config.min_samples
            || self.since_last_analysis < self.config.analysis_interval
        {
            return None;
        }

        self.since_last_analysis = 0;
        let analysis = self.analyze();
        info!(
            "Driving analysis over {} samples: aggression {:.2}, efficiency {:.2}, style {}",
            analysis.sample_count, analysis.aggression, analysis.efficiency, analysis.style
        );
        self.latest = Some(analysis.clone());
        Some(analysis)
    }

    /// Analyze the current window without changing it
    pub fn analyze(&self) -> PatternAnalysis {
        let count = self.window.len();
        if count == 0 {
            return PatternAnalysis::default();
        }
        let n = count as f64;

        let mut breakdown = AggressionBreakdown::default();
        let mut efficiency = 0.0;
        let mut contexts: BTreeMap<DrivingContext, usize> = BTreeMap::new();
        let (mut light, mut medium, mut heavy) = (0usize, 0usize, 0usize);

        for entry in self.window.iter() {
            let throttle = entry.sample.get(Parameter::ThrottlePosition);
            let rpm = entry.sample.get(Parameter::Rpm);
            let boost = entry.sample.get(Parameter::BoostPressure);

            if throttle.is_some_and(|t| t > AGGRESSIVE_THROTTLE) {
                breakdown.throttle += THROTTLE_WEIGHT;
            }
            if rpm.is_some_and(|r| r > AGGRESSIVE_RPM) {
                breakdown.rpm += RPM_WEIGHT;
            }
            if boost.is_some_and(|b| b > AGGRESSIVE_BOOST) {
                breakdown.boost += BOOST_WEIGHT;
            }

            if rpm.is_some_and(|r| (EFFICIENT_RPM.0..=EFFICIENT_RPM.1).contains(&r)) {
                efficiency += EFFICIENT_RPM_WEIGHT;
            }
            if throttle.is_some_and(|t| t < EFFICIENT_THROTTLE) {
                efficiency += EFFICIENT_THROTTLE_WEIGHT;
            }
            if entry.context.is_cruising() {
                efficiency += CRUISING_WEIGHT;
            }

            match throttle {
                Some(t) if t < LIGHT_THROTTLE => light += 1,
                Some(t) if t <= HEAVY_THROTTLE => medium += 1,
                Some(_) => heavy += 1,
                None => {}
            }
            *contexts.entry(entry.context).or_default() += 1;
        }

        breakdown.throttle /= n;
        breakdown.rpm /= n;
        breakdown.boost /= n;

        let throttle_readings = (light + medium + heavy).max(1) as f64;
        let throttle_usage = ThrottleUsage {
            light: light as f64 / throttle_readings,
            medium: medium as f64 / throttle_readings,
            heavy: heavy as f64 / throttle_readings,
        };

        let rpm_values = StatisticalFeatures::extract(self.window.iter().map(|e| &e.sample), Parameter::Rpm);
        let rpm = StatisticalFeatures::compute(&rpm_values);

        let mut analysis = PatternAnalysis {
            sample_count: count,
            aggression: breakdown.total().clamp(0.0, 1.0),
            aggression_breakdown: breakdown,
            efficiency: (efficiency / n).clamp(0.0, 1.0),
            rpm_mean: rpm.mean,
            rpm_std_dev: rpm.std_dev,
            typical_rpm_range: rpm.spread(0.5),
            throttle_usage,
            context_distribution: contexts
                .into_iter()
                .map(|(context, hits)| (context, hits as f64 / n))
                .collect(),
            style: DrivingStyle::default(),
            timestamp_ms: self.window.latest().map(|e| e.sample.timestamp_ms).unwrap_or(0),
        };
        analysis.style = self.scorer.style(&analysis);
        debug!("Context distribution: {:?}", analysis.context_distribution);
        analysis
    }

    /// Drop the window and any previous analysis
    pub fn reset(&mut self) {
        self.window.clear();
        self.since_last_analysis = 0;
        self.latest = None;
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spirited(i: u64) -> Sample {
        Sample::new(i)
            .with(Parameter::ThrottlePosition, 90.0)
            .with(Parameter::Rpm, 5500.0)
            .with(Parameter::Speed, 100.0)
    }

    fn cruising(i: u64) -> Sample {
        Sample::new(i)
            .with(Parameter::ThrottlePosition, 20.0)
            .with(Parameter::Rpm, 2200.0)
            .with(Parameter::Speed, 60.0)
    }

    #[test]
    fn test_spirited_window_is_aggressive() {
        let mut analyzer = PatternAnalyzer::default();
        for i in 0..60 {
            analyzer.ingest(&spirited(i));
        }
        let analysis = analyzer.analyze();

        assert_eq!(analysis.sample_count, 60);
        assert!(analysis.aggression > 0.7);
        assert!((analysis.aggression_breakdown.throttle - 0.4).abs() < 1e-9);
        assert!((analysis.aggression_breakdown.rpm - 0.4).abs() < 1e-9);
        assert_eq!(analysis.aggression_breakdown.boost, 0.0);
        assert_eq!(analysis.style, DrivingStyle::PerformanceEnthusiast);
        assert_eq!(analysis.throttle_usage.heavy, 1.0);
        assert_eq!(analysis.dominant_context(), Some(DrivingContext::PerformanceDriving));
    }

    #[test]
    fn test_cruising_window_is_efficient() {
        let mut analyzer = PatternAnalyzer::default();
        for i in 0..60 {
            analyzer.ingest(&cruising(i));
        }
        let analysis = analyzer.analyze();

        assert!((analysis.efficiency - 1.0).abs() < 1e-9);
        assert_eq!(analysis.aggression, 0.0);
        assert_eq!(analysis.style, DrivingStyle::EfficiencyFocused);
        assert_eq!(analysis.typical_rpm_range, (2200.0, 2200.0));
        assert_eq!(analysis.timestamp_ms, 59);
    }

    #[test]
    fn test_ingest_cadence() {
        let mut analyzer = PatternAnalyzer::default();
        let produced: Vec<u64> = (0..250)
            .filter_map(|i| analyzer.ingest(&cruising(i)).map(|_| i))
            .collect();

        // Every 100th sample once the minimum is windowed
        assert_eq!(produced, vec![99, 199]);
        assert_eq!(analyzer.window_len(), 150);
        assert_eq!(analyzer.latest_analysis().unwrap().sample_count, 150);
    }

    #[test]
    fn test_analyze_leaves_window_untouched() {
        let mut analyzer = PatternAnalyzer::default();
        for i in 0..10 {
            analyzer.ingest(&cruising(i));
        }
        let first = analyzer.analyze();
        let second = analyzer.analyze();
        assert_eq!(first, second);
        assert_eq!(analyzer.window_len(), 10);
    }

    #[test]
    fn test_custom_scorer() {
        struct AlwaysBalanced;
        impl StyleScorer for AlwaysBalanced {
            fn style(&self, _: &PatternAnalysis) -> DrivingStyle {
                DrivingStyle::BalancedAllRounder
            }
        }

        let mut analyzer = PatternAnalyzer::default().with_scorer(Box::new(AlwaysBalanced));
        analyzer.ingest(&spirited(0));
        assert_eq!(analyzer.analyze().style, DrivingStyle::BalancedAllRounder);
    }

    fn arb_sample() -> impl Strategy<Value = Sample> {
        (
            proptest::option::of(0.0f64..100.0),
            proptest::option::of(0.0f64..8000.0),
            proptest::option::of(-14.0f64..25.0),
            proptest::option::of(0.0f64..200.0),
        )
            .prop_map(|(throttle, rpm, boost, speed)| {
                let mut sample = Sample::new(0);
                for (parameter, value) in [
                    (Parameter::ThrottlePosition, throttle),
                    (Parameter::Rpm, rpm),
                    (Parameter::BoostPressure, boost),
                    (Parameter::Speed, speed),
                ] {
                    if let Some(value) = value {
                        sample.set(parameter, value);
                    }
                }
                sample
            })
    }

    proptest! {
        #[test]
        fn prop_scores_bounded_and_window_capped(samples in proptest::collection::vec(arb_sample(), 1..200)) {
            let mut analyzer = PatternAnalyzer::default();
            for sample in &samples {
                analyzer.ingest(sample);
                prop_assert!(analyzer.window_len() <= 150);
            }
            let analysis = analyzer.analyze();
            let b = analysis.aggression_breakdown;
            prop_assert!((0.0..=1.0).contains(&analysis.aggression));
            prop_assert!((0.0..=1.0).contains(&analysis.efficiency));
            for term in [b.throttle, b.rpm, b.boost] {
                prop_assert!((0.0..=1.0).contains(&term));
            }
            prop_assert!((b.total() - analysis.aggression).abs() < 1e-9);
            let shares: f64 = analysis.context_distribution.values().sum();
            prop_assert!((shares - 1.0).abs() < 1e-9);
        }
    }
}
