//! Vehicle Session
//!
//! One connected adapter and everything hanging off it: the poll loop, the
//! safety monitor, the driving pattern analyzer and the tuning advisor. The
//! presentation layer talks to [`VehicleSession`] and receives typed events.

mod error;
mod logging;
mod router;
mod session;
mod settings;

pub use error::SessionError;
pub use logging::init_logging;
pub use router::{Fanout, SampleRouter};
pub use session::VehicleSession;
pub use settings::{LoggingConfig, SessionConfig, ENV_PREFIX};
