//! Live Telemetry Pipeline
//!
//! Polls a configured parameter set over the shared command channel, turns
//! each cycle into a validated [`Sample`](obd_protocol::Sample) and hands it
//! to subscribers in registration order.

mod error;
mod pipeline;
mod status;
mod subscriber;

pub use error::PipelineError;
pub use pipeline::{PipelineConfig, PipelineState, PipelineStats, TelemetryPipeline};
pub use status::ConnectionStatus;
pub use subscriber::{BroadcastSubscriber, SampleSubscriber};
