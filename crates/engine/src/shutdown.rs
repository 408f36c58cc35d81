//! Operator-requested shutdown, honoured at unit boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable flag shared between the signal handler and the orchestrator.
///
/// The orchestrator checks it before starting each unit of work, never
/// between a confirmed remote write and the checkpoint update that follows.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_request() {
        let signal = ShutdownSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_requested());
        handle.request();
        assert!(signal.is_requested());
    }
}
