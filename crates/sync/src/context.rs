//! Collaborators shared by the cart and wishlist aggregates.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::warn;

use crate::backend::CommerceBackend;
use crate::cache::{CacheValue, DedupCache};
use crate::config::{GuestPolicy, SyncConfig};
use crate::error::{Result, SyncError};
use crate::session::{AuthState, Identity};
use crate::snapshot::{AccountSnapshot, AccountSnapshotStore};
use crate::storage::{KeyValueStore, write_json};

pub(crate) struct SyncContext<B> {
    pub backend: Option<B>,
    pub auth: AuthState,
    pub cache: DedupCache<CacheValue>,
    pub store: Arc<dyn KeyValueStore>,
    pub snapshots: AccountSnapshotStore,
    pub guest_policy: GuestPolicy,
    /// Serializes persistence and account switches.
    persist_lock: Mutex<()>,
}

impl<B: CommerceBackend> SyncContext<B> {
    pub fn new(config: &SyncConfig, store: Arc<dyn KeyValueStore>, backend: Option<B>) -> Self {
        Self {
            backend,
            auth: AuthState::new(),
            cache: DedupCache::new(&config.cache),
            snapshots: AccountSnapshotStore::new(Arc::clone(&store)),
            store,
            guest_policy: config.guest_policy,
            persist_lock: Mutex::new(()),
        }
    }

    /// Fail adds from anonymous visitors when the guest cart is disabled.
    pub fn check_guest_policy(&self) -> Result<()> {
        if self.guest_policy == GuestPolicy::RequireLogin && !self.auth.is_authenticated() {
            return Err(SyncError::AuthenticationRequired);
        }
        Ok(())
    }

    /// The signed-in identity, when there is also a backend to reach.
    pub fn remote(&self) -> Option<Identity> {
        self.backend.as_ref().and(self.auth.identity())
    }

    /// Whether `identity` is still the active account.
    pub fn is_active(&self, identity: &Identity) -> bool {
        self.auth
            .identity()
            .is_some_and(|active| active.email.canonical() == identity.email.canonical())
    }

    /// Take the persistence lock.
    ///
    /// Held while a collection is captured and written, and across account
    /// switches. Never taken while an aggregate's own lock is held.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one collection to wherever the active account keeps it.
    ///
    /// The value is captured under the lock so concurrent writers land in
    /// order. Failures are logged; the in-memory collection stays
    /// authoritative.
    pub fn persist_locked<T: Serialize>(
        &self,
        _guard: &MutexGuard<'_, ()>,
        anonymous_key: &str,
        capture: impl FnOnce() -> T,
        apply: impl FnOnce(&mut AccountSnapshot, T),
    ) {
        let value = capture();
        let result = match self.auth.identity() {
            Some(identity) => self
                .snapshots
                .update(identity.email.as_str(), |snapshot| apply(snapshot, value)),
            None => write_json(self.store.as_ref(), anonymous_key, &value),
        };

        if let Err(e) = result {
            warn!(key = anonymous_key, error = %e, "Failed to persist collection");
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context(guest_policy: GuestPolicy) -> Arc<SyncContext<crate::backend::HttpBackend>> {
    let config = SyncConfig {
        guest_policy,
        ..SyncConfig::default()
    };
    Arc::new(SyncContext::new(
        &config,
        Arc::new(crate::storage::MemoryStore::new()),
        None,
    ))
}
