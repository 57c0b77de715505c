//! Client-side view of the authentication provider.
//!
//! The provider itself is external; the engine only needs to know who is
//! signed in, with which session token, and when that changes.

use secrecy::SecretString;
use tokio::sync::watch;
use vitrine_core::Email;

/// A signed-in account.
#[derive(Clone)]
pub struct Identity {
    /// Account email address.
    pub email: Email,
    /// Session token presented to the commerce backend.
    pub token: SecretString,
}

impl Identity {
    /// Create an identity.
    #[must_use]
    pub const fn new(email: Email, token: SecretString) -> Self {
        Self { email, token }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Authentication state shared by the engine and its aggregates.
///
/// Cheap to clone. Subscribers are notified on every transition, which is how
/// gated UI actions learn to refresh.
#[derive(Debug, Clone)]
pub struct AuthState {
    tx: watch::Sender<Option<Identity>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    /// Create an unauthenticated state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Whether an account is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The signed-in account, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Subscribe to authentication changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// Mark `identity` as signed in. Returns the identity it replaced.
    pub fn set_identity(&self, identity: Identity) -> Option<Identity> {
        self.tx.send_replace(Some(identity))
    }

    /// Sign out. Returns the identity that was active.
    pub fn clear(&self) -> Option<Identity> {
        self.tx.send_replace(None)
    }
}
