//! Observable session state.
//!
//! A session is the pair of flags "authenticated" and "bootstrapped",
//! published on `tokio::sync::watch` channels. One instance is owned by the
//! composition root and cloned into whoever needs to observe it; clones
//! share the same channels.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Coarse session phase derived from the two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Discovery and the stored-token check have not settled yet.
    Unbootstrapped,
    /// Bootstrap settled and there is no valid token.
    Unauthenticated,
    /// Bootstrap settled and a valid token is held.
    Authenticated,
}

/// Point-in-time copy of the session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub bootstrapped: bool,
}

impl SessionSnapshot {
    /// Returns the phase these flags represent.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match (self.bootstrapped, self.authenticated) {
            (false, _) => SessionPhase::Unbootstrapped,
            (true, false) => SessionPhase::Unauthenticated,
            (true, true) => SessionPhase::Authenticated,
        }
    }
}

/// Process-wide session flags with subscribe semantics.
///
/// Both flags start `false`. `bootstrapped` flips to `true` exactly once and
/// never back; `authenticated` follows token lifecycle events.
#[derive(Debug, Clone)]
pub struct SessionState {
    authenticated: Arc<watch::Sender<bool>>,
    bootstrapped: Arc<watch::Sender<bool>>,
}

impl SessionState {
    /// Creates an unbootstrapped, unauthenticated session.
    #[must_use]
    pub fn new() -> Self {
        let (authenticated, _) = watch::channel(false);
        let (bootstrapped, _) = watch::channel(false);
        Self {
            authenticated: Arc::new(authenticated),
            bootstrapped: Arc::new(bootstrapped),
        }
    }

    /// Returns true if a valid token is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// Returns true once bootstrap has settled.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        *self.bootstrapped.borrow()
    }

    /// Returns both flags.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            authenticated: self.is_authenticated(),
            bootstrapped: self.is_bootstrapped(),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.snapshot().phase()
    }

    /// Subscribes to changes of the authenticated flag.
    #[must_use]
    pub fn subscribe_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    /// Subscribes to the bootstrapped flag.
    #[must_use]
    pub fn subscribe_bootstrapped(&self) -> watch::Receiver<bool> {
        self.bootstrapped.subscribe()
    }

    /// Waits until bootstrap has settled and returns the flags at that point.
    pub async fn wait_bootstrapped(&self) -> SessionSnapshot {
        let mut bootstrapped = self.subscribe_bootstrapped();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = bootstrapped.wait_for(|done| *done).await;
        self.snapshot()
    }

    /// Sets the authenticated flag, notifying subscribers only on change.
    pub(crate) fn set_authenticated(&self, authenticated: bool) -> bool {
        self.authenticated.send_if_modified(|current| {
            if *current == authenticated {
                false
            } else {
                *current = authenticated;
                true
            }
        })
    }

    /// Marks bootstrap as settled. Returns true only for the first call.
    pub(crate) fn mark_bootstrapped(&self) -> bool {
        self.bootstrapped.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
