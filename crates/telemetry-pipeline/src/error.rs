//! Pipeline Error Types

use obd_protocol::ObdError;
use thiserror::Error;

/// Errors starting or driving the poll loop
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `start` called while the loop is running
    #[error("Pipeline is already polling")]
    AlreadyPolling,

    /// Nothing requestable in the parameter set
    #[error("No requestable parameters configured")]
    EmptyParameterSet,

    #[error(transparent)]
    Obd(#[from] ObdError),
}
