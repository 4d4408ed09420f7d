//! Bounded Ring Buffer
//!
//! Fixed-capacity history used for the live sample stream and the driving
//! pattern window. Readers get snapshot copies; the owner is the only writer.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
