//! Progress reporting surface for long-running exports.

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    /// Probing the source and validating the encoder configuration.
    Preparing,
    /// Real-time frame capture.
    Extracting,
    /// Overlay composite and video encoding.
    Encoding,
    /// Container finalization.
    Muxing,
    Complete,
    Failed,
}

impl ExportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Extracting => "extracting",
            Self::Encoding => "encoding",
            Self::Muxing => "muxing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// A progress snapshot delivered to the caller's callback.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    pub phase: ExportPhase,

    /// Completion within the current phase, 0 to 100.
    pub percent: f64,

    pub current_frame: u64,
    pub total_frames: u64,

    /// Estimated seconds remaining in the current phase, when known.
    pub eta_secs: Option<f64>,
}

impl ExportProgress {
    pub fn phase_started(phase: ExportPhase) -> Self {
        Self {
            phase,
            percent: 0.0,
            current_frame: 0,
            total_frames: 0,
            eta_secs: None,
        }
    }
}

/// Invoked from the export task; must not block.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(ExportPhase::Extracting.as_str(), "extracting");
        assert_eq!(ExportPhase::Failed.as_str(), "failed");
    }
}
