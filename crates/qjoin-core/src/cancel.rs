//! Cooperative cancellation for in-flight optimizations.
//!
//! The optimizer polls the token between edge samples and at subset-level
//! boundaries; it never blocks on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tighten the deadline of a (possibly shared) token.
    pub fn limited_to(&self, timeout: Option<Duration>) -> Self {
        let mut token = self.clone();
        if let Some(t) = timeout {
            let candidate = Instant::now() + t;
            token.deadline = Some(match token.deadline {
                Some(existing) => existing.min(candidate),
                None => candidate,
            });
        }
        token
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }
}
