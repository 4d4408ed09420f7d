//! Component Health Assessment
//!
//! Scores the turbocharger and the fuel system from the most recent buffered
//! samples. Each component starts at 100 and loses a fixed penalty per
//! finding; the overall score is the mean of the component scores.

use obd_protocol::{Parameter, Sample};
use pattern_analyzer::StatisticalFeatures;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const FULL_SCORE: u8 = 100;

/// Limits a healthy engine stays within
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Most recent samples considered for the turbo
    pub turbo_window: usize,
    /// Most recent samples considered for the fuel system
    pub fuel_window: usize,
    /// Boost standard deviation above which control is unstable (PSI)
    pub max_boost_std_dev: f64,
    /// Peak boost considered dangerous (PSI)
    pub max_boost: f64,
    /// Boost below which the turbo counts as unspooled (PSI)
    pub spool_start_psi: f64,
    /// Boost at which the turbo counts as spooled (PSI)
    pub spool_target_psi: f64,
    /// Longest acceptable spool time in seconds
    pub max_spool_secs: f64,
    /// Fuel pressure below which the pump is failing
    pub min_fuel_pressure: f64,
    /// Average fuel pressure below which the pump is weak
    pub min_average_fuel_pressure: f64,
    /// Largest acceptable long-term fuel trim magnitude (%)
    pub max_long_fuel_trim: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            turbo_window: 100,
            fuel_window: 50,
            max_boost_std_dev: 1.5,
            max_boost: 25.0,
            spool_start_psi: 1.0,
            spool_target_psi: 15.0,
            max_spool_secs: 3.5,
            min_fuel_pressure: 70.0,
            min_average_fuel_pressure: 100.0,
            max_long_fuel_trim: 10.0,
        }
    }
}

impl HealthConfig {
    /// Samples needed to cover every component
    pub fn window(&self) -> usize {
        self.turbo_window.max(self.fuel_window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Turbo,
    FuelSystem,
}

/// Something wrong with a component and what to inspect
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthFinding {
    pub finding: String,
    pub recommendation: String,
    pub penalty: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub component: Component,
    pub score: u8,
    pub findings: Vec<HealthFinding>,
    pub metrics: BTreeMap<&'static str, f64>,
}

impl ComponentHealth {
    fn new(component: Component) -> Self {
        Self {
            component,
            score: FULL_SCORE,
            findings: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    fn penalize(&mut self, penalty: u8, finding: String, recommendation: &str) {
        self.score = self.score.saturating_sub(penalty);
        self.findings.push(HealthFinding {
            finding,
            recommendation: recommendation.to_string(),
            penalty,
        });
    }

    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub overall_score: u8,
    pub turbo: ComponentHealth,
    pub fuel_system: ComponentHealth,
    /// Samples the assessment was based on
    pub samples: usize,
}

impl HealthReport {
    pub fn findings(&self) -> impl Iterator<Item = &HealthFinding> + '_ {
        self.turbo.findings.iter().chain(self.fuel_system.findings.iter())
    }
}

/// Turns recent samples into a [`HealthReport`]
#[derive(Debug, Clone, Default)]
pub struct HealthAssessor {
    config: HealthConfig,
}

impl HealthAssessor {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Assess samples given oldest first
    pub fn assess(&self, samples: &[Sample]) -> HealthReport {
        let turbo = self.turbo(tail(samples, self.config.turbo_window));
        let fuel_system = self.fuel_system(tail(samples, self.config.fuel_window));
        let overall_score = ((u16::from(turbo.score) + u16::from(fuel_system.score)) / 2) as u8;

        for finding in turbo.findings.iter().chain(fuel_system.findings.iter()) {
            warn!("Health: {}", finding.finding);
        }
        debug!("Health assessed over {} samples, score {}", samples.len(), overall_score);

        HealthReport {
            overall_score,
            turbo,
            fuel_system,
            samples: samples.len(),
        }
    }

    fn turbo(&self, samples: &[Sample]) -> ComponentHealth {
        let mut health = ComponentHealth::new(Component::Turbo);
        let boost = StatisticalFeatures::compute(&StatisticalFeatures::extract(samples, Parameter::BoostPressure));
        if boost.count == 0 {
            return health;
        }
        let limits = &self.config;

        if let Some(spool_secs) = spool_time(samples, limits.spool_start_psi, limits.spool_target_psi) {
            health.metrics.insert("spool_time_s", spool_secs);
            if spool_secs > limits.max_spool_secs {
                health.penalize(
                    20,
                    format!("Slow spool: {:.1}s to {:.0} PSI", spool_secs, limits.spool_target_psi),
                    "Check for boost leaks and wastegate operation",
                );
            }
        }

        health.metrics.insert("boost_std_dev_psi", boost.std_dev);
        health.metrics.insert("boost_step_psi", boost.rate_of_change);
        if boost.std_dev > limits.max_boost_std_dev {
            health.penalize(
                15,
                format!("Boost unstable: {:.2} PSI standard deviation", boost.std_dev),
                "Inspect the wastegate diaphragm and boost control solenoid",
            );
        }

        health.metrics.insert("max_boost_psi", boost.max);
        if boost.max > limits.max_boost {
            health.penalize(
                25,
                format!("Overboost: peak {:.1} PSI", boost.max),
                "Inspect wastegate and boost control before driving hard again",
            );
        }
        health
    }

    fn fuel_system(&self, samples: &[Sample]) -> ComponentHealth {
        let mut health = ComponentHealth::new(Component::FuelSystem);
        let limits = &self.config;

        let pressure = StatisticalFeatures::compute(&StatisticalFeatures::extract(samples, Parameter::FuelPressure));
        if pressure.count > 0 {
            health.metrics.insert("min_fuel_pressure", pressure.min);
            health.metrics.insert("average_fuel_pressure", pressure.mean);
            if pressure.min < limits.min_fuel_pressure {
                health.penalize(
                    40,
                    format!("Fuel pressure dropped to {:.0}", pressure.min),
                    "Inspect the high pressure fuel pump now",
                );
            } else if pressure.mean < limits.min_average_fuel_pressure {
                health.penalize(
                    20,
                    format!("Low average fuel pressure: {:.0}", pressure.mean),
                    "Monitor high pressure fuel pump output",
                );
            }
        }

        let trim = samples.iter().rev().find_map(|sample| sample.get(Parameter::LongFuelTrim));
        if let Some(trim) = trim {
            health.metrics.insert("long_fuel_trim_pct", trim);
            if trim.abs() > limits.max_long_fuel_trim {
                health.penalize(
                    15,
                    format!("Long-term fuel trim at {:.1}%", trim),
                    "Check for intake leaks, injector performance and the MAF sensor",
                );
            }
        }
        health
    }
}

fn tail(samples: &[Sample], count: usize) -> &[Sample] {
    &samples[samples.len().saturating_sub(count)..]
}

/// Seconds of the latest rise from below `start` to at least `target`
fn spool_time(samples: &[Sample], start: f64, target: f64) -> Option<f64> {
    let mut unspooled_at = None;
    let mut latest = None;
    for sample in samples {
        let Some(boost) = sample.get(Parameter::BoostPressure) else {
            continue;
        };
        if boost < start {
            unspooled_at = Some(sample.timestamp_ms);
        } else if boost >= target {
            if let Some(from) = unspooled_at.take() {
                latest = Some(sample.timestamp_ms.saturating_sub(from) as f64 / 1000.0);
            }
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boost_trace(values: &[(u64, f64)]) -> Vec<Sample> {
        values
            .iter()
            .map(|&(ms, psi)| Sample::new(ms).with(Parameter::BoostPressure, psi))
            .collect()
    }

    #[test]
    fn test_healthy_engine_scores_full() {
        let samples: Vec<Sample> = (0..60)
            .map(|i| {
                Sample::new(i * 100)
                    .with(Parameter::BoostPressure, 12.0 + (i % 2) as f64 * 0.5)
                    .with(Parameter::FuelPressure, 160.0)
                    .with(Parameter::LongFuelTrim, 2.3)
            })
            .collect();
        let report = HealthAssessor::default().assess(&samples);

        assert_eq!(report.overall_score, 100);
        assert!(report.turbo.is_healthy() && report.fuel_system.is_healthy());
        assert_eq!(report.turbo.metrics["max_boost_psi"], 12.5);
        assert!((report.turbo.metrics["boost_step_psi"] - 0.5).abs() < 1e-9);
        assert_eq!(report.fuel_system.metrics["min_fuel_pressure"], 160.0);
        assert_eq!(report.samples, 60);
    }

    #[test]
    fn test_overboost_and_instability() {
        let samples = boost_trace(&[(0, 10.0), (100, 26.0), (200, 12.0), (300, 24.0)]);
        let report = HealthAssessor::default().assess(&samples);

        assert_eq!(report.turbo.findings.len(), 2);
        assert_eq!(report.turbo.score, 60);
        assert_eq!(report.fuel_system.score, 100);
        assert_eq!(report.overall_score, 80);
    }

    #[test]
    fn test_slow_spool() {
        let samples = boost_trace(&[(0, 0.0), (1000, 5.0), (3000, 10.0), (4500, 15.5), (4600, 15.5)]);
        let turbo = HealthAssessor::default().assess(&samples).turbo;

        assert_eq!(turbo.metrics["spool_time_s"], 4.5);
        assert!(turbo.findings[0].finding.starts_with("Slow spool"));
        assert_eq!(turbo.findings[0].penalty, 20);
        // The rise itself also reads as unstable boost
        assert_eq!(turbo.score, 65);
    }

    #[test]
    fn test_fuel_pressure_drop_outweighs_low_average() {
        let samples: Vec<Sample> = [150.0, 60.0, 90.0]
            .iter()
            .enumerate()
            .map(|(i, &p)| Sample::new(i as u64).with(Parameter::FuelPressure, p))
            .collect();
        let fuel = HealthAssessor::default().assess(&samples).fuel_system;

        assert_eq!(fuel.findings.len(), 1);
        assert_eq!(fuel.score, 60);
        assert_eq!(fuel.metrics["average_fuel_pressure"], 100.0);
    }

    #[test]
    fn test_latest_fuel_trim_is_judged() {
        let samples = vec![
            Sample::new(0).with(Parameter::LongFuelTrim, 2.0),
            Sample::new(1).with(Parameter::LongFuelTrim, -12.5),
        ];
        let fuel = HealthAssessor::default().assess(&samples).fuel_system;
        assert_eq!(fuel.score, 85);
        assert_eq!(fuel.metrics["long_fuel_trim_pct"], -12.5);
    }

    #[test]
    fn test_only_the_window_counts() {
        let mut samples = boost_trace(&[(0, 30.0)]);
        samples.extend((1..=100).map(|i| Sample::new(i * 100).with(Parameter::BoostPressure, 10.0)));
        let report = HealthAssessor::default().assess(&samples);

        assert!(report.turbo.is_healthy());
        assert_eq!(report.turbo.metrics["max_boost_psi"], 10.0);
    }

    #[test]
    fn test_no_samples() {
        let report = HealthAssessor::default().assess(&[]);
        assert_eq!(report.overall_score, 100);
        assert!(report.findings().next().is_none());
        assert!(report.turbo.metrics.is_empty());
    }
}
