//! Resource limits and cooperative cancellation.
//!
//! The engine bounds its own cost two ways: a recursion cap on
//! `(function, argument-fingerprint)` tuples repeating on the call stack
//! (short-circuits to a placeholder), and a global frame budget (aborts the
//! entry point with a diagnostic error the driver can choose to ignore).
//! Cancellation is a clonable token checked at statement boundaries.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Per-session evaluation limits.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum number of times one `(function, argument types)` tuple may
    /// appear on the stack before further calls short-circuit.
    pub recursion_cap: usize,
    /// Total call frames allowed per entry point.
    pub frame_budget: usize,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            recursion_cap: 16,
            frame_budget: 100_000,
        }
    }
}

/// Cooperative cancellation token, shared between host and engine.
///
/// Cancelling flips a flag; the evaluator observes it at the next statement
/// boundary, runs pending deferred thunks, and unwinds with a cancellation
/// error.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_observes_cancellation_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
