//! Cooperative cancellation

use crate::error::ParseError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag polled at line and amount boundaries.
///
/// Clones observe the same flag. A blocking read in progress is never
/// interrupted; the flag is seen once the read returns.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(ParseError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), ParseError> {
        if self.is_cancelled() {
            Err(ParseError::Cancelled)
        } else {
            Ok(())
        }
    }
}
