//! Safety Monitor Implementation

use crate::rules::{AlarmLevel, MonitoredParameter, ProtectiveAction, SafetyConfig};
use obd_protocol::{Dtc, Parameter, Sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// An alarm level change for one parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyEvent {
    pub parameter: Parameter,
    pub value: f64,
    /// Bound that was exceeded; `None` when returning to normal
    pub threshold: Option<f64>,
    pub level: AlarmLevel,
    pub previous_level: AlarmLevel,
    pub event: String,
    pub suggested_action: ProtectiveAction,
    pub timestamp_ms: u64,
}

/// Request to the actuation side to mitigate a Critical/Shutdown condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveActionRequest {
    pub action: ProtectiveAction,
    pub parameter: Parameter,
    pub level: AlarmLevel,
    pub value: f64,
    pub timestamp_ms: u64,
}

/// Everything one sample produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub events: Vec<SafetyEvent>,
    pub actions: Vec<ProtectiveActionRequest>,
}

impl Evaluation {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.actions.is_empty()
    }
}

/// Stored trouble codes split by urgency
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DtcAssessment {
    pub critical: Vec<Dtc>,
    pub other: Vec<Dtc>,
}

impl DtcAssessment {
    pub fn has_critical(&self) -> bool {
        !self.critical.is_empty()
    }
}

/// Tracks the alarm level of every monitored parameter
#[derive(Debug)]
pub struct SafetyMonitor {
    rules: Vec<MonitoredParameter>,
    levels: HashMap<Parameter, AlarmLevel>,
    actions_failed: usize,
}

impl SafetyMonitor {
    /// Create a new safety monitor
    pub fn new(config: SafetyConfig) -> Self {
        info!("Creating safety monitor with {} rules", config.rules.len());
        Self {
            rules: config.rules,
            levels: HashMap::new(),
            actions_failed: 0,
        }
    }

    /// Current level of a parameter (Normal if never evaluated)
    pub fn level(&self, parameter: Parameter) -> AlarmLevel {
        self.levels.get(&parameter).copied().unwrap_or_default()
    }

    /// Highest level across all monitored parameters
    pub fn overall_level(&self) -> AlarmLevel {
        self.levels.values().copied().max().unwrap_or_default()
    }

    /// Evaluate a sample; at most one event per monitored parameter
    pub fn evaluate(&mut self, sample: &Sample) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for monitored in &self.rules {
            let Some(value) = sample.get(monitored.parameter) else {
                continue;
            };
            let (level, threshold) = monitored.rule.classify(value);
            let previous_level = self.levels.get(&monitored.parameter).copied().unwrap_or_default();
            if level == previous_level {
                continue;
            }
            self.levels.insert(monitored.parameter, level);

            let event = SafetyEvent {
                parameter: monitored.parameter,
                value,
                threshold,
                level,
                previous_level,
                event: monitored.event.clone(),
                suggested_action: monitored.action,
                timestamp_ms: sample.timestamp_ms,
            };
            match level {
                AlarmLevel::Normal => info!("{} back to normal at {:.2}", monitored.parameter, value),
                AlarmLevel::Warning => warn!("{} warning: {} at {:.2}", monitored.parameter, monitored.event, value),
                AlarmLevel::Critical | AlarmLevel::Shutdown => error!(
                    "{} {}: {} at {:.2}, requesting {}",
                    monitored.parameter, level, monitored.event, value, monitored.action
                ),
            }
            metrics::counter!("safety_events_total", "level" => level.as_str()).increment(1);

            if level.requires_action() {
                evaluation.actions.push(ProtectiveActionRequest {
                    action: monitored.action,
                    parameter: monitored.parameter,
                    level,
                    value,
                    timestamp_ms: sample.timestamp_ms,
                });
            }
            evaluation.events.push(event);
        }

        evaluation
    }

    /// Log the actuation side's result for a request
    pub fn record_action_outcome(&mut self, request: &ProtectiveActionRequest, success: bool, detail: &str) {
        if success {
            info!("Protective action {} for {} applied: {}", request.action, request.parameter, detail);
        } else {
            self.actions_failed += 1;
            error!(
                "Protective action {} for {} failed: {}",
                request.action, request.parameter, detail
            );
        }
    }

    /// Number of protective actions reported as failed
    pub fn actions_failed(&self) -> usize {
        self.actions_failed
    }

    /// Split stored codes into critical and other, warning about critical ones
    pub fn assess_dtcs(&self, codes: &[Dtc]) -> DtcAssessment {
        let (critical, other): (Vec<Dtc>, Vec<Dtc>) = codes.iter().copied().partition(|code| code.is_critical());
        for code in &critical {
            warn!(
                "Critical trouble code {}: {}",
                code,
                code.description().unwrap_or("no description")
            );
        }
        DtcAssessment { critical, other }
    }

    /// Forget all alarm levels (end of session)
    pub fn reset(&mut self) {
        self.levels.clear();
        self.actions_failed = 0;
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new(SafetyConfig::default())
    }
}
