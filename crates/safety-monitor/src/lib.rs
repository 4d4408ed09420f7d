//! Safety Monitor
//!
//! Per-parameter threshold rules evaluated on every sample. Alarm level
//! changes become [`SafetyEvent`]s; Critical and Shutdown levels also request
//! a protective action from the actuation side. Recent history can also be
//! scored for turbo and fuel system health.

mod health;
mod monitor;
mod rules;

pub use health::{
    Component, ComponentHealth, HealthAssessor, HealthConfig, HealthFinding, HealthReport,
};
pub use monitor::{
    DtcAssessment, Evaluation, ProtectiveActionRequest, SafetyEvent, SafetyMonitor,
};
pub use rules::{
    default_rules, AlarmLevel, MonitoredParameter, ProtectiveAction, RuleError, SafetyConfig,
    ThresholdRule,
};
