use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation shared across worker tasks (spec §4.5
/// "Cancellation", §5). `completed` and `cancelled` are checked in that
/// order: the original's listener thread polls completion before
/// cancellation each tick, so once the stage reports done, an
/// already-asserted cancellation is a no-op (resolved open question,
/// `SPEC_FULL.md` §2).
#[derive(Clone, Default)]
pub struct CancellationFlag {
    completed: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once the stage should stop issuing new work.
    pub fn should_stop(&self) -> bool {
        if self.completed.load(Ordering::SeqCst) {
            return false;
        }
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_observed_before_cancellation_wins() {
        let flag = CancellationFlag::new();
        flag.mark_completed();
        flag.cancel();
        assert!(!flag.should_stop(), "completion should suppress cancellation");
    }

    #[test]
    fn cancellation_alone_stops_the_stage() {
        let flag = CancellationFlag::new();
        flag.cancel();
        assert!(flag.should_stop());
    }
}
