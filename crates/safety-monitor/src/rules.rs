//! Threshold rules and their defaults

use obd_protocol::Parameter;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Severity of a monitored parameter, ordered from harmless to stop-now
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Shutdown,
}

impl AlarmLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlarmLevel::Normal => "normal",
            AlarmLevel::Warning => "warning",
            AlarmLevel::Critical => "critical",
            AlarmLevel::Shutdown => "shutdown",
        }
    }

    /// Whether this level must trigger a protective action
    pub fn requires_action(self) -> bool {
        self >= AlarmLevel::Critical
    }
}

impl fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mitigation requested from the actuation side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveAction {
    ReduceBoost,
    EnrichAfr,
    ReduceTiming,
    ReduceLoad,
    LimitRpm,
    IncreaseCooling,
}

impl ProtectiveAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtectiveAction::ReduceBoost => "reduce_boost",
            ProtectiveAction::EnrichAfr => "enrich_afr",
            ProtectiveAction::ReduceTiming => "reduce_timing",
            ProtectiveAction::ReduceLoad => "reduce_load",
            ProtectiveAction::LimitRpm => "limit_rpm",
            ProtectiveAction::IncreaseCooling => "increase_cooling",
        }
    }
}

impl fmt::Display for ProtectiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a value maps to an alarm level. A value sitting on a bound takes that
/// bound's level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdRule {
    /// Too high is dangerous
    Upper {
        warning: f64,
        critical: f64,
        shutdown: Option<f64>,
    },
    /// Both sides are dangerous; bounds are (low, high)
    Range {
        warning: (f64, f64),
        critical: (f64, f64),
    },
    /// Too low is dangerous
    Lower {
        warning: f64,
        critical: f64,
        shutdown: Option<f64>,
    },
}

impl ThresholdRule {
    /// Level for a value, most severe bound checked first
    pub fn level(&self, value: f64) -> AlarmLevel {
        self.classify(value).0
    }

    /// Level for a value and the bound that put it there
    pub fn classify(&self, value: f64) -> (AlarmLevel, Option<f64>) {
        match *self {
            ThresholdRule::Upper {
                warning,
                critical,
                shutdown,
            } => match shutdown {
                Some(shutdown) if value >= shutdown => (AlarmLevel::Shutdown, Some(shutdown)),
                _ if value >= critical => (AlarmLevel::Critical, Some(critical)),
                _ if value >= warning => (AlarmLevel::Warning, Some(warning)),
                _ => (AlarmLevel::Normal, None),
            },
            ThresholdRule::Lower {
                warning,
                critical,
                shutdown,
            } => match shutdown {
                Some(shutdown) if value <= shutdown => (AlarmLevel::Shutdown, Some(shutdown)),
                _ if value <= critical => (AlarmLevel::Critical, Some(critical)),
                _ if value <= warning => (AlarmLevel::Warning, Some(warning)),
                _ => (AlarmLevel::Normal, None),
            },
            ThresholdRule::Range { warning, critical } => {
                if value <= critical.0 {
                    (AlarmLevel::Critical, Some(critical.0))
                } else if value >= critical.1 {
                    (AlarmLevel::Critical, Some(critical.1))
                } else if value <= warning.0 {
                    (AlarmLevel::Warning, Some(warning.0))
                } else if value >= warning.1 {
                    (AlarmLevel::Warning, Some(warning.1))
                } else {
                    (AlarmLevel::Normal, None)
                }
            }
        }
    }

    fn check(&self) -> Result<(), &'static str> {
        match *self {
            ThresholdRule::Upper {
                warning,
                critical,
                shutdown,
            } => {
                if warning > critical || shutdown.is_some_and(|s| critical > s) {
                    return Err("upper bounds must rise from warning to shutdown");
                }
            }
            ThresholdRule::Lower {
                warning,
                critical,
                shutdown,
            } => {
                if warning < critical || shutdown.is_some_and(|s| critical < s) {
                    return Err("lower bounds must fall from warning to shutdown");
                }
            }
            ThresholdRule::Range { warning, critical } => {
                if warning.0 > warning.1 || critical.0 > warning.0 || critical.1 < warning.1 {
                    return Err("critical range must enclose the warning range");
                }
            }
        }
        Ok(())
    }
}

/// A rule bound to a parameter, with its event tag and mitigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredParameter {
    pub parameter: Parameter,
    pub rule: ThresholdRule,
    /// Short tag carried by events, e.g. `overboost`
    pub event: String,
    pub action: ProtectiveAction,
}

impl MonitoredParameter {
    pub fn new(parameter: Parameter, rule: ThresholdRule, event: &str, action: ProtectiveAction) -> Self {
        Self {
            parameter,
            rule,
            event: event.to_string(),
            action,
        }
    }
}

/// Rejected safety configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("Invalid rule for {parameter}: {reason}")]
    InvalidRule {
        parameter: Parameter,
        reason: &'static str,
    },

    #[error("{0} is monitored more than once")]
    DuplicateParameter(Parameter),
}

/// Monitored parameters for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub rules: Vec<MonitoredParameter>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl SafetyConfig {
    /// Check bound ordering and that each parameter has at most one rule
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut seen = Vec::new();
        for monitored in &self.rules {
            if seen.contains(&monitored.parameter) {
                return Err(RuleError::DuplicateParameter(monitored.parameter));
            }
            seen.push(monitored.parameter);
            monitored.rule.check().map_err(|reason| RuleError::InvalidRule {
                parameter: monitored.parameter,
                reason,
            })?;
        }
        Ok(())
    }
}

/// Limits for a turbocharged direct-injection petrol engine
pub fn default_rules() -> Vec<MonitoredParameter> {
    use ProtectiveAction::*;
    vec![
        MonitoredParameter::new(
            Parameter::BoostPressure,
            ThresholdRule::Upper {
                warning: 18.5,
                critical: 22.0,
                shutdown: Some(25.0),
            },
            "overboost",
            ReduceBoost,
        ),
        MonitoredParameter::new(
            Parameter::CommandedAfr,
            ThresholdRule::Range {
                warning: (10.5, 15.5),
                critical: (9.5, 16.5),
            },
            "afr_out_of_range",
            EnrichAfr,
        ),
        MonitoredParameter::new(
            Parameter::KnockRetard,
            ThresholdRule::Upper {
                warning: 3.0,
                critical: 6.0,
                shutdown: Some(10.0),
            },
            "knock",
            ReduceTiming,
        ),
        MonitoredParameter::new(
            Parameter::EngineLoad,
            ThresholdRule::Upper {
                warning: 90.0,
                critical: 98.0,
                shutdown: None,
            },
            "engine_overload",
            ReduceLoad,
        ),
        MonitoredParameter::new(
            Parameter::Rpm,
            ThresholdRule::Upper {
                warning: 6500.0,
                critical: 6700.0,
                shutdown: Some(7000.0),
            },
            "overrev",
            LimitRpm,
        ),
        MonitoredParameter::new(
            Parameter::CoolantTemp,
            ThresholdRule::Upper {
                warning: 105.0,
                critical: 112.0,
                shutdown: Some(118.0),
            },
            "overheating",
            IncreaseCooling,
        ),
        MonitoredParameter::new(
            Parameter::IntakeTemp,
            ThresholdRule::Upper {
                warning: 50.0,
                critical: 65.0,
                shutdown: None,
            },
            "hot_intake",
            IncreaseCooling,
        ),
        MonitoredParameter::new(
            Parameter::FuelPressure,
            ThresholdRule::Lower {
                warning: 100.0,
                critical: 70.0,
                shutdown: Some(40.0),
            },
            "fuel_pressure_low",
            ReduceLoad,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(AlarmLevel::Shutdown > AlarmLevel::Critical);
        assert!(AlarmLevel::Critical > AlarmLevel::Warning);
        assert!(AlarmLevel::Warning > AlarmLevel::Normal);
        assert!(AlarmLevel::Critical.requires_action());
        assert!(!AlarmLevel::Warning.requires_action());
    }

    #[test]
    fn test_range_checks_both_sides() {
        let rule = ThresholdRule::Range {
            warning: (10.5, 15.5),
            critical: (9.5, 16.5),
        };
        assert_eq!(rule.classify(9.0), (AlarmLevel::Critical, Some(9.5)));
        assert_eq!(rule.classify(10.0), (AlarmLevel::Warning, Some(10.5)));
        assert_eq!(rule.classify(14.7), (AlarmLevel::Normal, None));
        assert_eq!(rule.classify(16.0), (AlarmLevel::Warning, Some(15.5)));
        assert_eq!(rule.classify(17.0), (AlarmLevel::Critical, Some(16.5)));
    }

    #[test]
    fn test_lower_rule() {
        let rule = ThresholdRule::Lower {
            warning: 100.0,
            critical: 70.0,
            shutdown: Some(40.0),
        };
        assert_eq!(rule.level(120.0), AlarmLevel::Normal);
        assert_eq!(rule.level(90.0), AlarmLevel::Warning);
        assert_eq!(rule.level(60.0), AlarmLevel::Critical);
        assert_eq!(rule.level(10.0), AlarmLevel::Shutdown);
    }

    #[test]
    fn test_upper_without_shutdown_caps_at_critical() {
        let rule = ThresholdRule::Upper {
            warning: 90.0,
            critical: 98.0,
            shutdown: None,
        };
        assert_eq!(rule.level(1000.0), AlarmLevel::Critical);
    }

    #[test]
    fn test_value_on_a_bound_takes_its_level() {
        let upper = ThresholdRule::Upper {
            warning: 18.5,
            critical: 22.0,
            shutdown: Some(25.0),
        };
        assert_eq!(upper.classify(25.0), (AlarmLevel::Shutdown, Some(25.0)));
        assert_eq!(upper.classify(22.0), (AlarmLevel::Critical, Some(22.0)));
        assert_eq!(upper.classify(18.5), (AlarmLevel::Warning, Some(18.5)));

        let lower = ThresholdRule::Lower {
            warning: 100.0,
            critical: 70.0,
            shutdown: Some(40.0),
        };
        assert_eq!(lower.level(100.0), AlarmLevel::Warning);
        assert_eq!(lower.level(70.0), AlarmLevel::Critical);
        assert_eq!(lower.level(40.0), AlarmLevel::Shutdown);

        let range = ThresholdRule::Range {
            warning: (10.5, 15.5),
            critical: (9.5, 16.5),
        };
        assert_eq!(range.level(9.5), AlarmLevel::Critical);
        assert_eq!(range.level(15.5), AlarmLevel::Warning);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SafetyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_misordered_bounds_are_rejected() {
        let config = SafetyConfig {
            rules: vec![MonitoredParameter::new(
                Parameter::BoostPressure,
                ThresholdRule::Upper {
                    warning: 25.0,
                    critical: 20.0,
                    shutdown: None,
                },
                "overboost",
                ProtectiveAction::ReduceBoost,
            )],
        };
        assert!(matches!(
            config.validate(),
            Err(RuleError::InvalidRule { parameter: Parameter::BoostPressure, .. })
        ));
    }

    #[test]
    fn test_duplicate_parameter_is_rejected() {
        let mut config = SafetyConfig::default();
        let first = config.rules[0].clone();
        config.rules.push(first);
        assert_eq!(
            config.validate(),
            Err(RuleError::DuplicateParameter(Parameter::BoostPressure))
        );
    }
}
