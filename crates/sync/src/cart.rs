//! Cart aggregate.
//!
//! Owns the cart lines of the active account (or of the anonymous visitor).
//! Every intent is two-phase:
//!
//! 1. The local map is mutated and persisted before the method returns.
//! 2. A [`Reconciliation`] converges the backend, when an account is signed
//!    in. Its failure is reported but never rolls the local change back.
//!
//! Lines are keyed by [`CompositeKey`], so adding the same product and size
//! twice sums quantities into one line.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vitrine_core::{CompositeKey, Price, ProductId, ProductType, RemoteLineId, SizeId};

use crate::backend::{CommerceBackend, NewCartLine, RemoteCartLine};
use crate::cache::{CacheKey, CacheValue};
use crate::context::SyncContext;
use crate::error::{Result, SyncError, add_breadcrumb};
use crate::legacy::LegacyCartEntry;
use crate::reconcile::{Reconciliation, Tracker};
use crate::session::Identity;
use crate::snapshot::SavedCollection;
use crate::storage::keys;
use crate::tombstone::Tombstones;

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_type: ProductType,
    #[serde(rename = "compositeKey")]
    pub key: CompositeKey,
    /// Always at least 1.
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_id: Option<SizeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Price>,
    /// Id of the matching backend line, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteLineId>,
}

impl CartItem {
    /// Create a bare line with no display fields.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        product_type: ProductType,
        quantity: u32,
        size_id: Option<SizeId>,
    ) -> Self {
        Self {
            product_id,
            product_type,
            key: CompositeKey::for_line(product_type, product_id, size_id),
            quantity: quantity.max(1),
            size_id,
            title: None,
            subtitle: None,
            description: None,
            image_url: None,
            unit_price: None,
            remote_id: None,
        }
    }

    /// `unit_price * quantity`, if the line is priced.
    #[must_use]
    pub fn line_total(&self) -> Option<Price> {
        self.unit_price.map(|price| price.line_total(self.quantity))
    }

    fn from_remote(line: &RemoteCartLine) -> Self {
        Self {
            title: line.title.clone(),
            subtitle: line.subtitle.clone(),
            description: line.description.clone(),
            image_url: line.image_url.clone(),
            unit_price: line.unit_price,
            remote_id: Some(line.id),
            ..Self::new(line.product_id, line.product_type, line.quantity, line.size_id)
        }
    }

    /// Fold `other`, a line with the same key, into this one.
    fn absorb(&mut self, other: Self) {
        self.quantity = self.quantity.saturating_add(other.quantity);
        self.fill_display(other);
    }

    /// Take display fields and remote id from `other` where this line has none.
    fn fill_display(&mut self, other: Self) {
        self.title = self.title.take().or(other.title);
        self.subtitle = self.subtitle.take().or(other.subtitle);
        self.description = self.description.take().or(other.description);
        self.image_url = self.image_url.take().or(other.image_url);
        self.unit_price = self.unit_price.or(other.unit_price);
        self.remote_id = self.remote_id.or(other.remote_id);
    }
}

/// Request to add units of a product to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddToCart {
    pub product_id: ProductId,
    pub product_type: ProductType,
    pub quantity: u32,
    pub size_id: Option<SizeId>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub unit_price: Option<Price>,
}

impl AddToCart {
    /// Add `quantity` units of an unsized line with no display fields.
    #[must_use]
    pub const fn new(product_id: ProductId, product_type: ProductType, quantity: u32) -> Self {
        Self {
            product_id,
            product_type,
            quantity,
            size_id: None,
            title: None,
            subtitle: None,
            description: None,
            image_url: None,
            unit_price: None,
        }
    }

    #[must_use]
    pub const fn with_size(mut self, size_id: SizeId) -> Self {
        self.size_id = Some(size_id);
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub const fn with_price(mut self, unit_price: Price) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    #[must_use]
    pub fn key(&self) -> CompositeKey {
        CompositeKey::for_line(self.product_type, self.product_id, self.size_id)
    }

    fn into_item(self) -> CartItem {
        CartItem {
            title: self.title,
            subtitle: self.subtitle,
            description: self.description,
            image_url: self.image_url,
            unit_price: self.unit_price,
            ..CartItem::new(self.product_id, self.product_type, self.quantity, self.size_id)
        }
    }
}

/// Reference to an existing cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRef {
    pub product_id: ProductId,
    pub product_type: ProductType,
    pub size_id: Option<SizeId>,
    /// Backend id, when the caller already knows it.
    pub remote_id: Option<RemoteLineId>,
}

impl LineRef {
    #[must_use]
    pub const fn new(product_id: ProductId, product_type: ProductType) -> Self {
        Self {
            product_id,
            product_type,
            size_id: None,
            remote_id: None,
        }
    }

    #[must_use]
    pub const fn with_size(mut self, size_id: SizeId) -> Self {
        self.size_id = Some(size_id);
        self
    }

    #[must_use]
    pub const fn with_remote_id(mut self, remote_id: RemoteLineId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    #[must_use]
    pub fn key(&self) -> CompositeKey {
        CompositeKey::for_line(self.product_type, self.product_id, self.size_id)
    }
}

/// Build a key-consistent map from stored lines.
///
/// Keys are recomputed from each line's fields, quantities below 1 are raised
/// to 1, and lines that collide on a key are summed.
pub(crate) fn collect_items(
    lines: impl IntoIterator<Item = CartItem>,
) -> IndexMap<CompositeKey, CartItem> {
    let mut items = IndexMap::new();
    for line in lines {
        let mut item = CartItem::new(line.product_id, line.product_type, line.quantity, line.size_id);
        item.fill_display(line);
        merge_item(&mut items, item);
    }
    items
}

/// Insert `item`, or sum it into the line already under its key.
fn merge_item(items: &mut IndexMap<CompositeKey, CartItem>, item: CartItem) {
    match items.get_mut(&item.key) {
        Some(existing) => existing.absorb(item),
        None => {
            items.insert(item.key.clone(), item);
        }
    }
}

/// Cart of the active account.
///
/// Cheap to clone; clones share state.
pub struct Cart<B> {
    ctx: Arc<SyncContext<B>>,
    items: Arc<Mutex<IndexMap<CompositeKey, CartItem>>>,
    removed: Tombstones,
    tracker: Tracker,
}

impl<B> Clone for Cart<B> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            items: Arc::clone(&self.items),
            removed: self.removed.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<B> std::fmt::Debug for Cart<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cart")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl<B: CommerceBackend> Cart<B> {
    pub(crate) fn new(ctx: Arc<SyncContext<B>>) -> Self {
        Self {
            ctx,
            items: Arc::new(Mutex::new(IndexMap::new())),
            removed: Tombstones::default(),
            tracker: Tracker::default(),
        }
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    /// All lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.with_items(|items| items.values().cloned().collect())
    }

    #[must_use]
    pub fn get(&self, key: &CompositeKey) -> Option<CartItem> {
        self.with_items(|items| items.get(key).cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.with_items(|items| IndexMap::len(items))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.with_items(|items| {
            items
                .values()
                .fold(0_u32, |count, item| count.saturating_add(item.quantity))
        })
    }

    /// Sum of priced line totals. Unpriced lines count as zero.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.with_items(|items| items.values().filter_map(CartItem::line_total).sum())
    }

    /// Whether backend work is outstanding.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.tracker.loading()
    }

    /// Message of the last failed reconciliation.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.tracker.error()
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Add units of a line, summing into an existing line with the same key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` for a zero quantity, and
    /// `AuthenticationRequired` when guests may not add. Neither touches the
    /// cart.
    pub fn add(&self, request: AddToCart) -> Result<Reconciliation> {
        if request.quantity == 0 {
            return Err(SyncError::InvalidQuantity);
        }
        self.ctx.check_guest_policy()?;

        let key = request.key();
        let line = NewCartLine {
            product_id: request.product_id,
            product_type: request.product_type,
            quantity: request.quantity,
            size_id: request.size_id,
        };
        add_breadcrumb("cart", "add", Some(&[("key", key.as_str())]));

        let item = request.into_item();
        let remote = {
            let guard = self.ctx.lock();
            self.with_items(|items| merge_item(items, item));
            self.removed.forget(&key);
            self.persist_locked(&guard);
            self.ctx.remote()
        };

        let Some(identity) = remote else {
            return Ok(self.tracker.settled());
        };

        let cart = self.clone();
        Ok(self.tracker.spawn(async move {
            let result = match cart.backend()?.add_cart_item(&identity.token, &line).await {
                Ok(remote) if cart.attach_remote_id(&identity, &key, remote.id) => {
                    cart.delete_remote(&identity, &key, remote.id).await
                }
                other => other.map(drop).map_err(SyncError::from),
            };
            cart.invalidate_remote(&identity).await;
            result
        }))
    }

    /// Add one unit to an existing line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line is not in the cart.
    pub fn increment(&self, line: &LineRef) -> Result<Reconciliation> {
        let key = line.key();
        add_breadcrumb("cart", "increment", Some(&[("key", key.as_str())]));

        let guard = self.ctx.lock();
        let (quantity, remote_id) = self
            .with_items(|items| {
                items.get_mut(&key).map(|item| {
                    item.quantity = item.quantity.saturating_add(1);
                    (item.quantity, item.remote_id.or(line.remote_id))
                })
            })
            .ok_or_else(|| SyncError::NotFound(key.clone()))?;
        self.persist_locked(&guard);
        let remote = self.ctx.remote();
        drop(guard);

        Ok(self.push_quantity(remote, remote_id, quantity))
    }

    /// Remove one unit from an existing line. A line at 1 stays at 1.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line is not in the cart.
    pub fn decrement(&self, line: &LineRef) -> Result<Reconciliation> {
        let key = line.key();
        add_breadcrumb("cart", "decrement", Some(&[("key", key.as_str())]));

        let guard = self.ctx.lock();
        let changed = self
            .with_items(|items| {
                items.get_mut(&key).map(|item| {
                    if item.quantity <= 1 {
                        return None;
                    }
                    item.quantity -= 1;
                    Some((item.quantity, item.remote_id.or(line.remote_id)))
                })
            })
            .ok_or_else(|| SyncError::NotFound(key.clone()))?;

        let Some((quantity, remote_id)) = changed else {
            return Ok(self.tracker.settled());
        };
        self.persist_locked(&guard);
        let remote = self.ctx.remote();
        drop(guard);

        Ok(self.push_quantity(remote, remote_id, quantity))
    }

    /// Delete a line. Removing a missing line is not an error.
    ///
    /// For a signed-in account the key is tombstoned until the backend
    /// confirms the delete, so a refresh cannot bring the line back. The
    /// backend is told once the line's remote id is known.
    pub fn remove(&self, line: &LineRef) -> Reconciliation {
        let key = line.key();
        add_breadcrumb("cart", "remove", Some(&[("key", key.as_str())]));

        let (remote, remote_id) = {
            let guard = self.ctx.lock();
            let removed = self.with_items(|items| items.shift_remove(&key));
            let existed = removed.is_some();
            let remote_id = removed.and_then(|item| item.remote_id).or(line.remote_id);
            let remote = self.ctx.remote();
            if remote.is_some() && (existed || remote_id.is_some()) {
                self.removed.record(key.clone(), remote_id);
            }
            self.persist_locked(&guard);
            (remote, remote_id)
        };

        let (Some(identity), Some(remote_id)) = (remote, remote_id) else {
            return self.tracker.settled();
        };

        let cart = self.clone();
        self.tracker.spawn(async move {
            let result = cart.delete_remote(&identity, &key, remote_id).await;
            cart.invalidate_remote(&identity).await;
            result
        })
    }

    /// Empty the cart.
    pub fn clear(&self) -> Reconciliation {
        add_breadcrumb("cart", "clear", None);

        let (remote, cleared) = {
            let guard = self.ctx.lock();
            let cleared: Vec<(CompositeKey, Option<RemoteLineId>)> = self.with_items(|items| {
                items
                    .drain(..)
                    .map(|(key, item)| (key, item.remote_id))
                    .collect()
            });
            let remote = self.ctx.remote();
            if remote.is_some() {
                for (key, remote_id) in &cleared {
                    self.removed.record(key.clone(), *remote_id);
                }
            }
            self.persist_locked(&guard);
            (remote, cleared)
        };

        let Some(identity) = remote else {
            return self.tracker.settled();
        };

        let keys: Vec<CompositeKey> = cleared.into_iter().map(|(key, _)| key).collect();
        let cart = self.clone();
        self.tracker.spawn(async move {
            let result = cart.backend()?.clear_cart(&identity.token).await;
            if result.is_ok() {
                cart.settle_removal(&identity, &keys);
            }
            cart.invalidate_remote(&identity).await;
            result.map_err(SyncError::from)
        })
    }

    /// Merge lines from the legacy flat cart.
    ///
    /// Entries without a product type get [`ProductType::LEGACY_DEFAULT`];
    /// entries with a quantity below 1 are skipped. Collisions sum.
    pub fn migrate_legacy(&self, entries: &[LegacyCartEntry]) -> Reconciliation {
        let lines: Vec<NewCartLine> = entries
            .iter()
            .filter_map(|entry| {
                Some(NewCartLine {
                    product_id: entry.id,
                    product_type: entry.product_type.unwrap_or(ProductType::LEGACY_DEFAULT),
                    quantity: entry.quantity()?,
                    size_id: None,
                })
            })
            .collect();

        if lines.is_empty() {
            return self.tracker.settled();
        }

        let remote = {
            let guard = self.ctx.lock();
            let keys: Vec<CompositeKey> = self.with_items(|items| {
                lines
                    .iter()
                    .map(|line| {
                        let item =
                            CartItem::new(line.product_id, line.product_type, line.quantity, None);
                        let key = item.key.clone();
                        merge_item(items, item);
                        key
                    })
                    .collect()
            });
            self.removed.forget_all(&keys);
            self.persist_locked(&guard);
            self.ctx.remote()
        };
        info!(lines = lines.len(), "Merged legacy cart");

        let Some(identity) = remote else {
            return self.tracker.settled();
        };

        let cart = self.clone();
        self.tracker.spawn(async move {
            let backend = cart.backend()?;
            let mut outcome = Ok(());
            for line in &lines {
                match backend.add_cart_item(&identity.token, line).await {
                    Ok(remote) => {
                        let key = CompositeKey::for_line(line.product_type, line.product_id, None);
                        if cart.attach_remote_id(&identity, &key, remote.id) {
                            if let Err(e) = cart.delete_remote(&identity, &key, remote.id).await {
                                outcome = Err(e);
                            }
                        }
                    }
                    Err(e) => outcome = Err(SyncError::from(e)),
                }
            }
            cart.invalidate_remote(&identity).await;
            outcome
        })
    }

    /// Pull the account's remote cart and merge it into the local one.
    ///
    /// Remote lines already present locally lend their remote id; the local
    /// quantity is kept. Remote lines missing locally are added, unless they
    /// are tombstoned: those are deleted from the backend again instead.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationRequired` when no account is signed in, or the
    /// backend error of the (possibly shared) list request. A failed retry
    /// of a tombstoned delete is logged, not returned.
    pub async fn refresh(&self) -> Result<()> {
        self.tracker.track(self.pull()).await
    }

    async fn pull(&self) -> Result<()> {
        let identity = self
            .ctx
            .auth
            .identity()
            .ok_or(SyncError::AuthenticationRequired)?;
        let Some(backend) = self.ctx.backend.as_ref() else {
            return Ok(());
        };

        let key = CacheKey::Cart(identity.email.canonical()).render();
        let value = self
            .ctx
            .cache
            .fetch(
                &key,
                || async {
                    backend
                        .list_cart(&identity.token)
                        .await
                        .map(|lines| CacheValue::Cart(Arc::new(lines)))
                },
                None,
            )
            .await?;

        let CacheValue::Cart(lines) = value else {
            return Err(SyncError::Internal(format!("unexpected cached value under {key}")));
        };

        let retries = {
            let guard = self.ctx.lock();
            if !self.ctx.is_active(&identity) {
                debug!("Account changed during refresh, discarding remote cart");
                return Ok(());
            }

            let tombstoned = self.removed.keys();
            let mut listed = HashSet::new();
            let mut retries = Vec::new();
            self.with_items(|items| {
                for line in lines.iter() {
                    let remote = CartItem::from_remote(line);
                    listed.insert(remote.key.clone());
                    if tombstoned.contains(&remote.key) {
                        retries.push((remote.key, line.id));
                        continue;
                    }
                    match items.get_mut(&remote.key) {
                        Some(existing) => existing.fill_display(remote),
                        None => {
                            items.insert(remote.key.clone(), remote);
                        }
                    }
                }
            });
            self.removed.retain_listed(&listed);
            self.persist_locked(&guard);
            retries
        };
        debug!(remote_lines = lines.len(), tombstoned = retries.len(), "Merged remote cart");

        for (key, remote_id) in &retries {
            if let Err(e) = self.delete_remote(&identity, key, *remote_id).await {
                warn!(key = %key, error = %e, "Retrying removed cart line failed");
            }
        }
        if !retries.is_empty() {
            self.invalidate_remote(&identity).await;
        }
        Ok(())
    }

    // =========================================================================
    // Engine hooks
    // =========================================================================

    /// Replace every line and tombstone without persisting.
    pub(crate) fn restore(&self, saved: SavedCollection<CartItem>) {
        let fresh = collect_items(saved.items.into_values());
        self.with_items(|items| *items = fresh);
        self.removed.restore(saved.removed);
    }

    /// Serializable copy of the current lines and tombstones.
    pub(crate) fn saved(&self) -> SavedCollection<CartItem> {
        SavedCollection {
            items: self.with_items(|items| items.clone()),
            removed: self.removed.saved(),
        }
    }

    fn persist_locked(&self, guard: &MutexGuard<'_, ()>) {
        self.ctx.persist_locked(
            guard,
            keys::ANONYMOUS_CART,
            || self.saved(),
            |snapshot, saved| snapshot.cart = saved,
        );
    }

    fn push_quantity(
        &self,
        remote: Option<Identity>,
        remote_id: Option<RemoteLineId>,
        quantity: u32,
    ) -> Reconciliation {
        let (Some(identity), Some(remote_id)) = (remote, remote_id) else {
            return self.tracker.settled();
        };

        let cart = self.clone();
        self.tracker.spawn(async move {
            let result = cart
                .backend()?
                .update_cart_quantity(&identity.token, remote_id, quantity)
                .await;
            cart.invalidate_remote(&identity).await;
            result.map_err(SyncError::from)
        })
    }

    /// Record the backend id of a freshly added line.
    ///
    /// Returns `true` when the line was removed while the add was in flight;
    /// the caller then owes the backend a delete.
    fn attach_remote_id(&self, identity: &Identity, key: &CompositeKey, remote_id: RemoteLineId) -> bool {
        let guard = self.ctx.lock();
        if !self.ctx.is_active(identity) {
            return false;
        }
        let attached = self.with_items(|items| {
            items
                .get_mut(key)
                .map(|item| item.remote_id = Some(remote_id))
                .is_some()
        });
        let orphaned = !attached && self.removed.resolve(key, remote_id);
        if attached || orphaned {
            self.persist_locked(&guard);
        }
        orphaned
    }

    /// Delete a backend line and drop its tombstone once confirmed.
    async fn delete_remote(
        &self,
        identity: &Identity,
        key: &CompositeKey,
        remote_id: RemoteLineId,
    ) -> Result<()> {
        self.backend()?
            .remove_cart_item(&identity.token, remote_id)
            .await?;
        self.settle_removal(identity, std::slice::from_ref(key));
        Ok(())
    }

    fn settle_removal(&self, identity: &Identity, keys: &[CompositeKey]) {
        let guard = self.ctx.lock();
        if self.ctx.is_active(identity) && self.removed.forget_all(keys) {
            self.persist_locked(&guard);
        }
    }

    async fn invalidate_remote(&self, identity: &Identity) {
        self.ctx
            .cache
            .invalidate_pattern(&CacheKey::Cart(identity.email.canonical()).render())
            .await;
    }

    fn backend(&self) -> Result<&B> {
        self.ctx
            .backend
            .as_ref()
            .ok_or_else(|| SyncError::Internal("no backend configured".to_string()))
    }

    fn with_items<T>(&self, f: impl FnOnce(&mut IndexMap<CompositeKey, CartItem>) -> T) -> T {
        // Every mutation completes before the guard drops; a poisoned map is still consistent.
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GuestPolicy;
    use crate::context::test_context;
    use crate::storage::read_json;

    fn cart(policy: GuestPolicy) -> Cart<crate::backend::HttpBackend> {
        Cart::new(test_context(policy))
    }

    fn shirt(quantity: u32) -> AddToCart {
        AddToCart::new(ProductId::new(5), ProductType::Clothing, quantity).with_size(SizeId::new(2))
    }

    #[tokio::test]
    async fn test_same_key_sums_into_one_line() {
        let cart = cart(GuestPolicy::Allow);
        cart.add(shirt(1)).unwrap().await.unwrap();
        cart.add(shirt(2)).unwrap().await.unwrap();
        cart.add(shirt(4)).unwrap().await.unwrap();

        let items = cart.items();
        assert_eq!(items.len(), 1);
        let line = items.first().unwrap();
        assert_eq!(line.key.as_str(), "roupas:5:2");
        assert_eq!(line.quantity, 7);
    }

    #[tokio::test]
    async fn test_sizes_are_distinct_lines() {
        let cart = cart(GuestPolicy::Allow);
        cart.add(shirt(1)).unwrap().await.unwrap();
        cart.add(AddToCart::new(ProductId::new(5), ProductType::Clothing, 1).with_size(SizeId::new(3)))
            .unwrap()
            .await
            .unwrap();
        cart.add(AddToCart::new(ProductId::new(5), ProductType::Bags, 1))
            .unwrap()
            .await
            .unwrap();

        let keys: Vec<String> = cart.items().iter().map(|i| i.key.to_string()).collect();
        assert_eq!(keys, ["roupas:5:2", "roupas:5:3", "bolsas:5"]);
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let cart = cart(GuestPolicy::Allow);
        assert!(matches!(cart.add(shirt(0)), Err(SyncError::InvalidQuantity)));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_guest_add_requires_login_before_mutation() {
        let cart = cart(GuestPolicy::RequireLogin);
        assert!(matches!(
            cart.add(shirt(1)),
            Err(SyncError::AuthenticationRequired)
        ));
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_decrement_floors_at_one() {
        let cart = cart(GuestPolicy::Allow);
        cart.add(shirt(2)).unwrap().await.unwrap();
        let line = LineRef::new(ProductId::new(5), ProductType::Clothing).with_size(SizeId::new(2));

        cart.decrement(&line).unwrap().await.unwrap();
        cart.decrement(&line).unwrap().await.unwrap();

        assert_eq!(cart.get(&line.key()).unwrap().quantity, 1);
        cart.increment(&line).unwrap().await.unwrap();
        assert_eq!(cart.get(&line.key()).unwrap().quantity, 2);
    }

    #[test]
    fn test_adjusting_missing_line_is_not_found() {
        let cart = cart(GuestPolicy::Allow);
        let line = LineRef::new(ProductId::new(1), ProductType::Bags);
        assert!(matches!(cart.increment(&line), Err(SyncError::NotFound(_))));
        assert!(matches!(cart.decrement(&line), Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cart = cart(GuestPolicy::Allow);
        cart.add(shirt(1)).unwrap().await.unwrap();
        cart.add(AddToCart::new(ProductId::new(9), ProductType::Bags, 1))
            .unwrap()
            .await
            .unwrap();

        cart.remove(&LineRef::new(ProductId::new(9), ProductType::Bags))
            .await
            .unwrap();
        assert_eq!(cart.len(), 1);

        cart.remove(&LineRef::new(ProductId::new(9), ProductType::Bags))
            .await
            .unwrap();
        cart.clear().await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_subtotal_counts_unpriced_lines_as_zero() {
        let cart = cart(GuestPolicy::Allow);
        cart.add(
            AddToCart::new(ProductId::new(1), ProductType::Bags, 2).with_price(Price::from_cents(10_000)),
        )
        .unwrap()
        .await
        .unwrap();
        cart.add(AddToCart::new(ProductId::new(2), ProductType::Bags, 1))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.subtotal(), Price::from_cents(20_000));
        assert_eq!(cart.item_count(), 3);
    }

    #[tokio::test]
    async fn test_migrate_legacy_sums_with_existing_line() {
        let cart = cart(GuestPolicy::Allow);
        cart.add(AddToCart::new(ProductId::new(5), ProductType::Clothing, 1))
            .unwrap()
            .await
            .unwrap();

        let entries: Vec<LegacyCartEntry> =
            serde_json::from_str(r#"[{"id": 5, "qty": 2}, {"id": 7, "qty": 1}, {"id": 8, "qty": 0}]"#)
                .unwrap();
        cart.migrate_legacy(&entries).await.unwrap();

        let key = CompositeKey::parse("roupas:5").unwrap();
        assert_eq!(cart.get(&key).unwrap().quantity, 3);
        assert_eq!(cart.len(), 2);
    }

    #[tokio::test]
    async fn test_mutations_persist_to_anonymous_slot() {
        let ctx = test_context(GuestPolicy::Allow);
        let cart = Cart::new(Arc::clone(&ctx));
        cart.add(shirt(2)).unwrap().await.unwrap();

        let saved: SavedCollection<CartItem> =
            read_json(ctx.store.as_ref(), keys::ANONYMOUS_CART).unwrap();
        assert_eq!(saved.items.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_requires_login() {
        let cart = cart(GuestPolicy::Allow);
        assert!(matches!(
            cart.refresh().await,
            Err(SyncError::AuthenticationRequired)
        ));
        assert_eq!(cart.error().unwrap(), "Authentication required");
    }

    #[test]
    fn test_collect_items_rekeys_and_merges() {
        let mut orphan = CartItem::new(ProductId::new(5), ProductType::Clothing, 2, None);
        orphan.key = CompositeKey::parse("bolsas:99").unwrap();
        let twin = CartItem::new(ProductId::new(5), ProductType::Clothing, 1, None);
        let mut zero = CartItem::new(ProductId::new(6), ProductType::Clothing, 1, None);
        zero.quantity = 0;

        let items = collect_items([orphan, twin, zero]);
        let keys: Vec<&str> = items.keys().map(CompositeKey::as_str).collect();
        assert_eq!(keys, ["roupas:5", "roupas:6"]);
        let quantities: Vec<u32> = items.values().map(|item| item.quantity).collect();
        assert_eq!(quantities, [3, 1]);
    }
}
