//! Cooperative cancellation.
//!
//! The pipeline polls a shared flag at phase boundaries and inside the
//! capture and encode loops. Cancellation is cooperative, not preemptive:
//! an in-flight bitmap materialization or encoder submission runs to
//! completion before the next check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ExportError, ExportResult};

/// A cloneable cancellation token backed by a shared atomic flag.
///
/// Clones observe the same flag, so any holder can cancel an export in
/// progress from another task or thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(ExportError::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> ExportResult<()> {
        if self.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ExportError::Cancelled)));
    }
}
