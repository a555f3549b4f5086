//! Cooperative cancellation signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-job cancellation flag shared between the orchestrator and the task.
///
/// Setting the flag never interrupts the task. Tasks poll
/// [`is_cancel_requested`](Self::is_cancel_requested) at their own
/// checkpoints and exit early when it turns true. The flag goes from
/// `false` to `true` at most once and is never reset.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns `true` if this call raised it, `false` if it
    /// was already raised.
    ///
    /// Whether the owning job is still live is decided by
    /// [`JobRecord::request_cancel`](super::JobRecord::request_cancel), which
    /// is what callers outside the runner should use.
    pub(crate) fn signal(&self) -> bool {
        !self.requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancel_requested());
    }

    #[test]
    fn test_signal_is_one_way() {
        let token = CancellationToken::new();
        assert!(token.signal());
        assert!(!token.signal());
        assert!(token.is_cancel_requested());
    }

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();

        let handle = std::thread::spawn(move || token.signal());
        assert!(handle.join().unwrap());
        assert!(observer.is_cancel_requested());
    }
}
