//! Singular-mode gate.
//!
//! The gate holds the token of the app that currently owns the page. An app
//! that wants to mount in singular mode calls [`SingularGate::acquire`]: it
//! waits for the current token to resolve and then installs a fresh token
//! of its own in the same critical section, so two waiters released by the
//! same resolution cannot both proceed. The owner resolves its token when
//! its unmount sequence completes (or when its mount fails before it ever
//! became active).

use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::deferred::Deferred;

/// Process-wide (per orchestrator) serialization point for singular mode.
#[derive(Debug, Default)]
pub struct SingularGate {
    current: Mutex<Option<Deferred>>,
}

impl SingularGate {
    /// Create an idle gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the active window to end, then claim the next one.
    ///
    /// The returned token must eventually be resolved by the caller.
    pub async fn acquire(&self) -> Deferred {
        loop {
            let previous = {
                let mut slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
                match slot.as_ref() {
                    Some(token) if !token.is_resolved() => token.clone(),
                    _ => {
                        let token = Deferred::new();
                        *slot = Some(token.clone());
                        trace!("singular gate claimed");
                        return token;
                    },
                }
            };
            previous.wait().await;
        }
    }

    /// The token of the current (or last) window, if any.
    #[must_use]
    pub fn current(&self) -> Option<Deferred> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether no window is active.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.current().is_none_or(|token| token.is_resolved())
    }
}
