//! One-way circuit breaker: the first provider failure disables translation
//! for the rest of the process. There is no timed reset.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Open the breaker. Returns true if this call performed the transition.
    pub fn trip(&self, reason: &str) -> bool {
        let tripped = !self.open.swap(true, Ordering::SeqCst);
        if tripped {
            warn!(reason, "translation provider failed, disabling translation for this session");
        }
        tripped
    }
}
