//! Traceburn Common Utilities
//!
//! Shared infrastructure for all Traceburn crates:
//! - Error types and result aliases
//! - Clock, drift, and throughput/ETA utilities
//! - Cooperative cancellation token
//! - Tracing/logging initialization
//! - Configuration loading

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use cancel::*;
pub use clock::*;
pub use config::*;
pub use error::*;
