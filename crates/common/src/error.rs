//! Error types shared across Traceburn crates.
//!
//! The export pipeline distinguishes five caller-visible failure kinds:
//! load failures, stall timeouts, global timeouts, cancellation, and
//! encoder configuration errors. Cancellation is deliberately its own
//! variant so callers can avoid surfacing it as a failure.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for Traceburn operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The source clip could not be opened or probed. Fatal, no retry.
    #[error("Failed to load source: {message}")]
    Load { message: String },

    /// No qualifying frame arrived within the idle window during capture.
    #[error(
        "Frame capture stalled: no new frame for {}s; keep the capture source visible and foregrounded",
        idle.as_secs()
    )]
    StallTimeout { idle: Duration },

    /// The export exceeded its absolute time ceiling.
    #[error(
        "Export timed out after {}s (limit {}s); try a shorter clip or a lower resolution",
        elapsed.as_secs(),
        limit.as_secs()
    )]
    GlobalTimeout { elapsed: Duration, limit: Duration },

    /// The caller cancelled the export. Not a true failure.
    #[error("Export cancelled")]
    Cancelled,

    /// The encoder rejected its configuration, almost always a
    /// profile/level vs. resolution capability mismatch.
    #[error("Encoder configuration rejected ({width}x{height}, profile {profile}): {message}")]
    EncoderConfig {
        message: String,
        width: u32,
        height: u32,
        profile: String,
    },

    /// A mid-stream encoder failure. Tolerated once; fatal when persistent.
    #[error("Encoder error: {message}")]
    EncoderRuntime { message: String },

    #[error("Frame source error: {message}")]
    Source { message: String },

    #[error("Mux error: {message}")]
    Mux { message: String },

    #[error("Overlay error: {message}")]
    Overlay { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ExportError.
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn encoder_runtime(msg: impl Into<String>) -> Self {
        Self::EncoderRuntime {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn overlay(msg: impl Into<String>) -> Self {
        Self::Overlay {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error is a caller-initiated cancellation rather than
    /// a genuine failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error is one of the two watchdog timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StallTimeout { .. } | Self::GlobalTimeout { .. })
    }
}
