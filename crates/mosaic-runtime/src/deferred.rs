//! One-shot completion signal.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-shot rendezvous: any number of tasks wait, one resolves.
///
/// Clones share the same signal. Resolving is idempotent; only the first
/// call has an observable effect, and every waiter (past or future) sees
/// the signal exactly once. A `Deferred` carries no payload.
#[derive(Debug, Clone)]
pub struct Deferred {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    /// Create an unresolved signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Create a signal that is already resolved.
    #[must_use]
    pub fn resolved() -> Self {
        let deferred = Self::new();
        deferred.resolve();
        deferred
    }

    /// Resolve the signal. Returns `true` if this call resolved it and
    /// `false` if it was already resolved.
    pub fn resolve(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    /// Whether the signal has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is resolved. Returns immediately if it already
    /// is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Whether two handles refer to the same signal.
    #[must_use]
    pub fn same_signal(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let d = Deferred::new();
        assert!(!d.is_resolved());
        assert!(d.resolve());
        assert!(!d.resolve());
        assert!(d.is_resolved());
    }

    #[tokio::test]
    async fn test_wait_after_resolve_returns() {
        let d = Deferred::resolved();
        tokio::time::timeout(Duration::from_millis(50), d.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_waiters_released_by_clone() {
        let d = Deferred::new();
        let waiter = {
            let d = d.clone();
            tokio::spawn(async move { d.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let other = d.clone();
        assert!(other.same_signal(&d));
        other.resolve();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_wait_blocks() {
        let d = Deferred::new();
        let res = tokio::time::timeout(Duration::from_secs(5), d.wait()).await;
        assert!(res.is_err());
        assert!(!Deferred::new().same_signal(&d));
    }
}
