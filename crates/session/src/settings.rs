//! Session configuration
//!
//! Layered as defaults, then an optional TOML file, then `OBD_` environment
//! variables (`OBD_LOGGING__LEVEL=debug`, `OBD_PIPELINE__INTERVAL_MS=100`).

use crate::error::SessionError;
use obd_protocol::{ObdProtocol, TransportConfig};
use pattern_analyzer::AnalyzerConfig;
use safety_monitor::{HealthConfig, SafetyConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use telemetry_pipeline::PipelineConfig;
use tracing::debug;
use tuning_advisor::AdvisorConfig;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "OBD";

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Everything needed to open and run a vehicle session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub protocol: ObdProtocol,
    pub pipeline: PipelineConfig,
    pub safety: SafetyConfig,
    pub health: HealthConfig,
    pub analyzer: AnalyzerConfig,
    pub advisor: AdvisorConfig,
    pub logging: LoggingConfig,
}

impl SessionConfig {
    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> Result<Self, SessionError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: SessionConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        self.safety.validate()?;
        Ok(())
    }
}
