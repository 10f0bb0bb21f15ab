//! Epoch bookkeeping and slow-path cancellation.
//!
//! The epoch is a monotonic counter identifying a committed `GlobalState`
//! version. The manager is shared (`Arc`) between a `GlobalState` and its
//! deep copies, so a cancellation requested against the original is observed
//! by the copy an in-flight slow path is mutating.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Shared epoch counter and cancellation flag.
#[derive(Debug, Default)]
pub struct EpochManager {
    current: AtomicU32,
    cancellation_expected: AtomicBool,
}

impl EpochManager {
    /// Creates a manager at epoch zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently committed epoch.
    pub fn current(&self) -> u32 {
        self.current.load(Ordering::SeqCst)
    }

    /// Attempts to commit `epoch`. A cancellable commit fails if a
    /// cancellation was requested since the run started; the request is
    /// consumed either way.
    pub fn try_commit_epoch(&self, epoch: u32, cancellable: bool) -> bool {
        let cancelled = self.cancellation_expected.swap(false, Ordering::SeqCst);
        if cancellable && cancelled {
            log::debug!("commit of epoch {epoch} cancelled");
            return false;
        }
        self.current.store(epoch, Ordering::SeqCst);
        true
    }

    /// Requests cancellation of the in-flight cancellable run, if any.
    pub fn request_cancellation(&self) {
        self.cancellation_expected.store(true, Ordering::SeqCst);
    }

    /// Whether a cancellation has been requested and not yet consumed.
    /// Checked at preemption checkpoints.
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation_expected.load(Ordering::SeqCst)
    }

    /// Consumes a pending cancellation request, returning whether one was
    /// pending. Called by a run that aborts at a checkpoint.
    pub fn consume_cancellation(&self) -> bool {
        self.cancellation_expected.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellable_commit_observes_cancellation() {
        let epochs = EpochManager::new();
        assert!(epochs.try_commit_epoch(1, true));
        assert_eq!(epochs.current(), 1);

        epochs.request_cancellation();
        assert!(epochs.cancellation_requested());
        assert!(!epochs.try_commit_epoch(2, true));
        // The failed commit leaves the prior epoch in place.
        assert_eq!(epochs.current(), 1);
        // The request was consumed.
        assert!(epochs.try_commit_epoch(2, true));
        assert_eq!(epochs.current(), 2);
    }

    #[test]
    fn non_cancellable_commit_ignores_cancellation() {
        let epochs = EpochManager::new();
        epochs.request_cancellation();
        assert!(epochs.try_commit_epoch(1, false));
        assert_eq!(epochs.current(), 1);
    }
}
