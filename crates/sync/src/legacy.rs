//! One-time import of the single-category cart.
//!
//! Earlier storefront versions kept the cart as a flat JSON array of
//! `{id, qty}` under the `cart` key, before product types and sizes existed.
//! On first start the array is merged into the cart aggregate and the key is
//! deleted, whether or not it could be parsed, so the import never repeats.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vitrine_core::{ProductId, ProductType};

use crate::backend::CommerceBackend;
use crate::cart::Cart;
use crate::reconcile::Reconciliation;
use crate::storage::{KeyValueStore, keys};

/// An entry of the legacy cart array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCartEntry {
    pub id: ProductId,
    pub qty: i64,
    /// Present only in carts written during the multi-category rollout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductType>,
}

impl LegacyCartEntry {
    /// The quantity as a line quantity, if it is at least 1.
    #[must_use]
    pub fn quantity(&self) -> Option<u32> {
        u32::try_from(self.qty).ok().filter(|qty| *qty >= 1)
    }
}

/// Result of [`migrate_legacy_cart`].
#[derive(Debug)]
pub struct LegacyMigration {
    /// Entries read from the legacy array.
    pub entries: usize,
    /// Backend push of the merged lines.
    pub reconciliation: Reconciliation,
}

/// Read the legacy array. Anything unreadable yields no entries; unreadable
/// elements are skipped individually.
#[must_use]
pub fn read_legacy_cart(store: &dyn KeyValueStore) -> Vec<LegacyCartEntry> {
    let raw = match store.get(keys::LEGACY_CART) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read legacy cart");
            return Vec::new();
        }
    };

    let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "Discarding malformed legacy cart");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping malformed legacy cart entry");
                None
            }
        })
        .collect()
}

/// Merge the legacy cart into `cart` and delete it.
pub fn migrate_legacy_cart<B: CommerceBackend>(
    store: &dyn KeyValueStore,
    cart: &Cart<B>,
) -> LegacyMigration {
    let entries = read_legacy_cart(store);

    let reconciliation = if entries.is_empty() {
        Reconciliation::settled()
    } else {
        cart.migrate_legacy(&entries)
    };

    match store.remove(keys::LEGACY_CART) {
        Ok(()) if entries.is_empty() => debug!("Legacy cart slot cleared"),
        Ok(()) => info!(entries = entries.len(), "Legacy cart migrated and removed"),
        Err(e) => warn!(error = %e, "Failed to remove legacy cart"),
    }

    LegacyMigration {
        entries: entries.len(),
        reconciliation,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use vitrine_core::CompositeKey;

    use super::*;
    use crate::cart::AddToCart;
    use crate::config::GuestPolicy;
    use crate::context::test_context;
    use crate::storage::{MemoryStore, StorageError};

    #[test]
    fn test_quantity_must_be_positive() {
        let entry = |qty| LegacyCartEntry {
            id: ProductId::new(1),
            qty,
            product_type: None,
        };
        assert_eq!(entry(2).quantity(), Some(2));
        assert_eq!(entry(0).quantity(), None);
        assert_eq!(entry(-4).quantity(), None);
    }

    #[tokio::test]
    async fn test_migration_merges_and_removes_slot() {
        let ctx = test_context(GuestPolicy::Allow);
        let cart = Cart::new(Arc::clone(&ctx));
        cart.add(AddToCart::new(ProductId::new(5), ProductType::Clothing, 1))
            .unwrap()
            .await
            .unwrap();
        ctx.store
            .set(keys::LEGACY_CART, r#"[{"id": 5, "qty": 2}, {"id": 7, "qty": 1}]"#)
            .unwrap();

        let migration = migrate_legacy_cart(ctx.store.as_ref(), &cart);
        migration.reconciliation.await.unwrap();

        assert_eq!(migration.entries, 2);
        let five = cart.get(&CompositeKey::parse("roupas:5").unwrap()).unwrap();
        assert_eq!(five.quantity, 3);
        assert!(cart.get(&CompositeKey::parse("roupas:7").unwrap()).is_some());
        assert_eq!(ctx.store.get(keys::LEGACY_CART).unwrap(), None);
    }

    #[test]
    fn test_corrupt_slot_is_still_removed() {
        let ctx = test_context(GuestPolicy::Allow);
        let cart = Cart::new(Arc::clone(&ctx));
        ctx.store.set(keys::LEGACY_CART, "{oops").unwrap();

        let migration = migrate_legacy_cart(ctx.store.as_ref(), &cart);

        assert_eq!(migration.entries, 0);
        assert!(migration.reconciliation.is_settled());
        assert!(cart.is_empty());
        assert_eq!(ctx.store.get(keys::LEGACY_CART).unwrap(), None);
    }

    /// Reads fail, deletes work.
    struct UnreadableStore(MemoryStore);

    impl KeyValueStore for UnreadableStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Poisoned)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.0.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.0.keys()
        }
    }

    #[test]
    fn test_unreadable_slot_is_still_removed() {
        let ctx = test_context(GuestPolicy::Allow);
        let cart = Cart::new(Arc::clone(&ctx));
        let store = UnreadableStore(MemoryStore::new());
        store.set(keys::LEGACY_CART, r#"[{"id": 5, "qty": 2}]"#).unwrap();

        let migration = migrate_legacy_cart(&store, &cart);

        assert_eq!(migration.entries, 0);
        assert!(cart.is_empty());
        assert_eq!(store.0.get(keys::LEGACY_CART).unwrap(), None);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let ctx = test_context(GuestPolicy::Allow);
        ctx.store
            .set(
                keys::LEGACY_CART,
                r#"[{"id": 1, "qty": 1}, {"id": "x"}, {"id": 2, "qty": 1, "productType": "bolsas"}]"#,
            )
            .unwrap();

        let entries = read_legacy_cart(ctx.store.as_ref());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get(1).unwrap().product_type, Some(ProductType::Bags));
    }
}
