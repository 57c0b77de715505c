//! Per-account persisted cart and wishlist.
//!
//! A browser profile may be shared by several accounts. Each account's
//! collections live under their own key, derived from the canonical email,
//! so switching accounts never mixes one account's lines into another's.
//!
//! The store only handles serialized copies. The live maps belong to the
//! cart and wishlist aggregates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};
use vitrine_core::{CompositeKey, RemoteLineId};

use crate::cart::CartItem;
use crate::storage::{KeyValueStore, StorageError, keys, read_json, write_json};
use crate::wishlist::WishlistItem;

/// Serialized line items of one collection.
///
/// Also the shape of the anonymous cart and wishlist slots. `items` must be a
/// mapping; entries inside it that cannot be read are skipped one by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct SavedCollection<T> {
    #[serde(deserialize_with = "lenient_entries")]
    pub items: IndexMap<CompositeKey, T>,
    /// Removed lines whose backend deletion is not confirmed yet.
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "lenient_entries"
    )]
    pub removed: IndexMap<CompositeKey, Option<RemoteLineId>>,
}

impl<T> Default for SavedCollection<T> {
    fn default() -> Self {
        Self {
            items: IndexMap::new(),
            removed: IndexMap::new(),
        }
    }
}

fn lenient_entries<'de, D, T>(deserializer: D) -> Result<IndexMap<CompositeKey, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = IndexMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(raw_key, value)| {
            let entry = CompositeKey::parse(&raw_key)
                .map_err(|e| e.to_string())
                .and_then(|key| {
                    serde_json::from_value(value)
                        .map(|entry| (key, entry))
                        .map_err(|e| e.to_string())
                });
            match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key = %raw_key, error = %e, "Skipping unreadable saved entry");
                    None
                }
            }
        })
        .collect())
}

/// Everything persisted for one account.
///
/// Deserialization requires both `wishlist.items` and `cart.items` to be
/// mappings; anything else is rejected and read as "no snapshot".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub wishlist: SavedCollection<WishlistItem>,
    pub cart: SavedCollection<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Reads and writes account snapshots through a [`KeyValueStore`].
#[derive(Clone)]
pub struct AccountSnapshotStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for AccountSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSnapshotStore").finish_non_exhaustive()
    }
}

/// Storage key of an account's snapshot.
///
/// Emails that differ only in case or surrounding whitespace share a key.
#[must_use]
pub fn snapshot_key_for(email: &str) -> String {
    keys::account_snapshot(&email.trim().to_lowercase())
}

impl AccountSnapshotStore {
    /// Create a snapshot store over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist `snapshot` for `email`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized or written.
    pub fn save(&self, email: &str, snapshot: &AccountSnapshot) -> Result<(), StorageError> {
        let key = snapshot_key_for(email);
        let stamped = AccountSnapshot {
            saved_at: Some(Utc::now()),
            ..snapshot.clone()
        };
        write_json(self.store.as_ref(), &key, &stamped)?;
        debug!(
            key,
            cart = snapshot.cart.items.len(),
            wishlist = snapshot.wishlist.items.len(),
            "Saved account snapshot"
        );
        Ok(())
    }

    /// Load the snapshot of `email`.
    ///
    /// Returns `None` when nothing is stored or the stored value is malformed.
    #[must_use]
    pub fn load(&self, email: &str) -> Option<AccountSnapshot> {
        read_json(self.store.as_ref(), &snapshot_key_for(email))
    }

    /// Delete the snapshot of `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear(&self, email: &str) -> Result<(), StorageError> {
        let key = snapshot_key_for(email);
        self.store.remove(&key)?;
        info!(key, "Cleared account snapshot");
        Ok(())
    }

    /// Rewrite one part of the snapshot of `email`, keeping the rest.
    ///
    /// A missing or malformed snapshot starts from empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn update(
        &self,
        email: &str,
        apply: impl FnOnce(&mut AccountSnapshot),
    ) -> Result<(), StorageError> {
        let mut snapshot = self.load(email).unwrap_or_default();
        apply(&mut snapshot);
        self.save(email, &snapshot)
    }

    /// Emails with a stored snapshot, in canonical form.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn accounts(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(keys::ACCOUNT_PREFIX).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vitrine_core::{ProductId, ProductType};

    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> (Arc<MemoryStore>, AccountSnapshotStore) {
        let memory = Arc::new(MemoryStore::new());
        let snapshots = AccountSnapshotStore::new(memory.clone());
        (memory, snapshots)
    }

    fn snapshot_with_cart_line() -> AccountSnapshot {
        let item = CartItem::new(ProductId::new(5), ProductType::Clothing, 2, None);
        let mut snapshot = AccountSnapshot::default();
        snapshot.cart.items.insert(item.key.clone(), item);
        snapshot
    }

    #[test]
    fn test_key_is_canonical() {
        assert_eq!(snapshot_key_for("a@x.com"), snapshot_key_for("  A@X.com "));
        assert_ne!(snapshot_key_for("a@x.com"), snapshot_key_for("b@x.com"));
    }

    #[test]
    fn test_snapshot_isolation() {
        let (_, snapshots) = store();
        let snapshot = snapshot_with_cart_line();
        snapshots.save("a@x.com", &snapshot).unwrap();

        let loaded = snapshots.load("A@X.com ").unwrap();
        assert_eq!(loaded.cart, snapshot.cart);
        assert!(loaded.saved_at.is_some());
        assert!(snapshots.load("b@x.com").is_none());
    }

    #[test]
    fn test_malformed_snapshot_reads_as_absent() {
        let (memory, snapshots) = store();
        memory
            .set(&snapshot_key_for("a@x.com"), r#"{"cart": {"items": {}}}"#)
            .unwrap();
        assert!(snapshots.load("a@x.com").is_none());

        memory
            .set(&snapshot_key_for("a@x.com"), r#"{"cart": [], "wishlist": {"items": {}}}"#)
            .unwrap();
        assert!(snapshots.load("a@x.com").is_none());

        memory.set(&snapshot_key_for("a@x.com"), "not json").unwrap();
        assert!(snapshots.load("a@x.com").is_none());
    }

    #[test]
    fn test_unreadable_lines_are_skipped_individually() {
        let (memory, snapshots) = store();
        memory
            .set(
                &snapshot_key_for("a@x.com"),
                r#"{
                    "wishlist": {"items": {
                        "bolsas:9": {"productId": 9, "productType": "bolsas", "compositeKey": "bolsas:9"},
                        "chapeus:1": {"productId": 1, "productType": "chapeus", "compositeKey": "chapeus:1"}
                    }},
                    "cart": {"items": {
                        "roupas:5": {"productId": 5, "productType": "roupas", "compositeKey": "roupas:5", "quantity": 2},
                        "roupas:6": {"productId": 6, "productType": "roupas", "compositeKey": "roupas:6", "quantity": -1}
                    }}
                }"#,
            )
            .unwrap();

        let loaded = snapshots.load("a@x.com").unwrap();
        assert_eq!(loaded.wishlist.items.len(), 1);
        assert_eq!(loaded.cart.items.len(), 1);
        assert_eq!(
            loaded
                .cart
                .items
                .get(&CompositeKey::parse("roupas:5").unwrap())
                .unwrap()
                .quantity,
            2
        );

        // Rewriting one part keeps the readable lines of the other
        snapshots
            .update("a@x.com", |snapshot| snapshot.cart.items.clear())
            .unwrap();
        assert_eq!(snapshots.load("a@x.com").unwrap().wishlist.items.len(), 1);
    }

    #[test]
    fn test_removed_lines_round_trip() {
        let (_, snapshots) = store();
        let mut snapshot = AccountSnapshot::default();
        snapshot
            .cart
            .removed
            .insert(CompositeKey::parse("bolsas:1").unwrap(), Some(RemoteLineId::new(4)));
        snapshot
            .cart
            .removed
            .insert(CompositeKey::parse("bolsas:2").unwrap(), None);
        snapshots.save("a@x.com", &snapshot).unwrap();

        let loaded = snapshots.load("a@x.com").unwrap();
        assert_eq!(loaded.cart.removed, snapshot.cart.removed);
    }

    #[test]
    fn test_minimal_shape_is_accepted() {
        let (memory, snapshots) = store();
        memory
            .set(
                &snapshot_key_for("a@x.com"),
                r#"{"wishlist": {"items": {}}, "cart": {"items": {}}}"#,
            )
            .unwrap();
        assert_eq!(snapshots.load("a@x.com").unwrap(), AccountSnapshot::default());
    }

    #[test]
    fn test_update_keeps_other_part() {
        let (_, snapshots) = store();
        snapshots.save("a@x.com", &snapshot_with_cart_line()).unwrap();

        let item = WishlistItem::new(ProductId::new(9), ProductType::Bags);
        snapshots
            .update("a@x.com", |snapshot| {
                snapshot.wishlist.items.insert(item.key.clone(), item);
            })
            .unwrap();

        let loaded = snapshots.load("a@x.com").unwrap();
        assert_eq!(loaded.cart.items.len(), 1);
        assert_eq!(loaded.wishlist.items.len(), 1);
    }

    #[test]
    fn test_clear_and_accounts() {
        let (_, snapshots) = store();
        snapshots.save("a@x.com", &AccountSnapshot::default()).unwrap();
        snapshots.save("B@x.com", &AccountSnapshot::default()).unwrap();
        assert_eq!(snapshots.accounts().unwrap(), vec!["a@x.com", "b@x.com"]);

        snapshots.clear(" A@x.com").unwrap();
        assert!(snapshots.load("a@x.com").is_none());
        assert_eq!(snapshots.accounts().unwrap(), vec!["b@x.com"]);
    }
}
