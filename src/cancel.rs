//! Cooperative cancellation, generalizing `rocfl`'s backing-store `closed: AtomicBool` idiom
//! (see `ocfl::repo::OcflRepo::close`) into a token threaded through every public operation
//! (spec §5: "every public operation accepts a cancellable scope").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{IndexError, Result};

/// A cheaply-cloned cancellation signal. All clones observe the same underlying flag, so
/// cancelling one cancels every caller sharing the token -- the backing-store I/O, the stat
/// worker pool, and the database driver.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(IndexError::Cancelled)` if cancellation has been requested, and `Ok(())`
    /// otherwise. Call between suspension points so cancellation is observed promptly.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(IndexError::Cancelled)
        } else {
            Ok(())
        }
    }
}
