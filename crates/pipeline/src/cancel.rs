use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation signal for long-running pipeline work. Cloning the
/// flag shares the underlying signal.
#[derive(Clone, Default, Debug)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arms the flag so the next run of work starts clean.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
