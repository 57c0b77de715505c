//! Lines removed locally whose backend deletion is not yet confirmed.
//!
//! A refresh skips tombstoned keys instead of restoring them from the
//! backend list, and retries their deletion. A tombstone goes away when the
//! backend confirms the delete, when the backend no longer lists the line, or
//! when the user adds the line again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use vitrine_core::{CompositeKey, RemoteLineId};

/// Removed keys, with the backend id when known.
pub type Removed = IndexMap<CompositeKey, Option<RemoteLineId>>;

/// Tombstones of one collection.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tombstones {
    removed: Arc<Mutex<Removed>>,
}

impl Tombstones {
    /// Remember that `key` was removed. A known id is never overwritten by
    /// an unknown one.
    pub fn record(&self, key: CompositeKey, remote_id: Option<RemoteLineId>) {
        self.with_removed(|removed| {
            let entry = removed.entry(key).or_insert(None);
            *entry = remote_id.or(*entry);
        });
    }

    /// Drop the tombstone of `key`. Returns whether there was one.
    pub fn forget(&self, key: &CompositeKey) -> bool {
        self.with_removed(|removed| removed.shift_remove(key).is_some())
    }

    /// Drop the tombstones of `keys`. Returns whether any was dropped.
    pub fn forget_all(&self, keys: &[CompositeKey]) -> bool {
        self.with_removed(|removed| {
            let before = removed.len();
            removed.retain(|key, _| !keys.contains(key));
            removed.len() != before
        })
    }

    /// Give a tombstone its backend id. Returns whether `key` is tombstoned.
    pub fn resolve(&self, key: &CompositeKey, remote_id: RemoteLineId) -> bool {
        self.with_removed(|removed| {
            removed
                .get_mut(key)
                .map(|known| *known = Some(remote_id))
                .is_some()
        })
    }

    /// Keep only tombstones whose key is in `listed`. Returns whether any
    /// was dropped.
    pub fn retain_listed(&self, listed: &HashSet<CompositeKey>) -> bool {
        self.with_removed(|removed| {
            let before = removed.len();
            removed.retain(|key, _| listed.contains(key));
            removed.len() != before
        })
    }

    pub fn keys(&self) -> HashSet<CompositeKey> {
        self.with_removed(|removed| removed.keys().cloned().collect())
    }

    pub fn saved(&self) -> Removed {
        self.with_removed(|removed| removed.clone())
    }

    pub fn restore(&self, saved: Removed) {
        self.with_removed(|removed| *removed = saved);
    }

    fn with_removed<T>(&self, f: impl FnOnce(&mut Removed) -> T) -> T {
        let mut removed = self.removed.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut removed)
    }
}
