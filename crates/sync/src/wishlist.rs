//! Wishlist aggregate.
//!
//! Same two-phase shape as the cart, without quantities: a product is either
//! in the wishlist or not, and adding it again changes nothing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vitrine_core::{CompositeKey, Price, ProductId, ProductType, RemoteLineId};

use crate::backend::{CommerceBackend, NewWishlistLine, RemoteWishlistLine};
use crate::cache::{CacheKey, CacheValue};
use crate::context::SyncContext;
use crate::error::{Result, SyncError, add_breadcrumb};
use crate::reconcile::{Reconciliation, Tracker};
use crate::session::Identity;
use crate::snapshot::SavedCollection;
use crate::storage::keys;
use crate::tombstone::Tombstones;

/// A product on the wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub product_id: ProductId,
    pub product_type: ProductType,
    #[serde(rename = "compositeKey")]
    pub key: CompositeKey,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteLineId>,
}

impl WishlistItem {
    #[must_use]
    pub fn new(product_id: ProductId, product_type: ProductType) -> Self {
        Self {
            product_id,
            product_type,
            key: CompositeKey::for_wishlist(product_type, product_id),
            title: None,
            subtitle: None,
            description: None,
            image_url: None,
            unit_price: None,
            remote_id: None,
        }
    }

    fn from_remote(line: &RemoteWishlistLine) -> Self {
        Self {
            title: line.title.clone(),
            subtitle: line.subtitle.clone(),
            description: line.description.clone(),
            image_url: line.image_url.clone(),
            unit_price: line.unit_price,
            remote_id: Some(line.id),
            ..Self::new(line.product_id, line.product_type)
        }
    }

    fn fill_display(&mut self, other: Self) {
        self.title = self.title.take().or(other.title);
        self.subtitle = self.subtitle.take().or(other.subtitle);
        self.description = self.description.take().or(other.description);
        self.image_url = self.image_url.take().or(other.image_url);
        self.unit_price = self.unit_price.or(other.unit_price);
        self.remote_id = self.remote_id.or(other.remote_id);
    }
}

/// Request to put a product on the wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddToWishlist {
    pub product_id: ProductId,
    pub product_type: ProductType,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub unit_price: Option<Price>,
}

impl AddToWishlist {
    #[must_use]
    pub const fn new(product_id: ProductId, product_type: ProductType) -> Self {
        Self {
            product_id,
            product_type,
            title: None,
            subtitle: None,
            description: None,
            image_url: None,
            unit_price: None,
        }
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

    fn into_item(self) -> WishlistItem {
        WishlistItem {
            title: self.title,
            subtitle: self.subtitle,
            description: self.description,
            image_url: self.image_url,
            unit_price: self.unit_price,
            ..WishlistItem::new(self.product_id, self.product_type)
        }
    }
}

/// Reference to a wishlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WishlistRef {
    pub product_id: ProductId,
    pub product_type: ProductType,
    pub remote_id: Option<RemoteLineId>,
}

impl WishlistRef {
    #[must_use]
    pub const fn new(product_id: ProductId, product_type: ProductType) -> Self {
        Self {
            product_id,
            product_type,
            remote_id: None,
        }
    }

    #[must_use]
    pub const fn with_remote_id(mut self, remote_id: RemoteLineId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    #[must_use]
    pub fn key(&self) -> CompositeKey {
        CompositeKey::for_wishlist(self.product_type, self.product_id)
    }
}

/// Build a key-consistent map from stored entries. Duplicates collapse.
pub(crate) fn collect_items(
    entries: impl IntoIterator<Item = WishlistItem>,
) -> IndexMap<CompositeKey, WishlistItem> {
    let mut items: IndexMap<CompositeKey, WishlistItem> = IndexMap::new();
    for entry in entries {
        let mut item = WishlistItem::new(entry.product_id, entry.product_type);
        item.fill_display(entry);
        match items.get_mut(&item.key) {
            Some(existing) => existing.fill_display(item),
            None => {
                items.insert(item.key.clone(), item);
            }
        }
    }
    items
}

/// Wishlist of the active account.
///
/// Cheap to clone; clones share state.
pub struct Wishlist<B> {
    ctx: Arc<SyncContext<B>>,
    items: Arc<Mutex<IndexMap<CompositeKey, WishlistItem>>>,
    removed: Tombstones,
    tracker: Tracker,
}

impl<B> Clone for Wishlist<B> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            items: Arc::clone(&self.items),
            removed: self.removed.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<B> std::fmt::Debug for Wishlist<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wishlist")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl<B: CommerceBackend> Wishlist<B> {
    pub(crate) fn new(ctx: Arc<SyncContext<B>>) -> Self {
        Self {
            ctx,
            items: Arc::new(Mutex::new(IndexMap::new())),
            removed: Tombstones::default(),
            tracker: Tracker::default(),
        }
    }

    /// All entries, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<WishlistItem> {
        self.with_items(|items| items.values().cloned().collect())
    }

    #[must_use]
    pub fn contains(&self, product_type: ProductType, product_id: ProductId) -> bool {
        let key = CompositeKey::for_wishlist(product_type, product_id);
        self.with_items(|items| items.contains_key(&key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.with_items(|items| IndexMap::len(items))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.tracker.loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.tracker.error()
    }

    /// Put a product on the wishlist. Already-present products are left as is.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationRequired` when guests may not add.
    pub fn add(&self, request: AddToWishlist) -> Result<Reconciliation> {
        self.ctx.check_guest_policy()?;

        let item = request.into_item();
        let key = item.key.clone();
        let line = NewWishlistLine {
            product_id: item.product_id,
            product_type: item.product_type,
        };
        add_breadcrumb("wishlist", "add", Some(&[("key", key.as_str())]));

        let guard = self.ctx.lock();
        let inserted = self.with_items(|items| {
            if items.contains_key(&key) {
                return false;
            }
            items.insert(key.clone(), item);
            true
        });
        if !inserted {
            debug!(key = %key, "Already on wishlist");
            return Ok(self.tracker.settled());
        }
        self.removed.forget(&key);
        self.persist_locked(&guard);
        let remote = self.ctx.remote();
        drop(guard);

        let Some(identity) = remote else {
            return Ok(self.tracker.settled());
        };

        let wishlist = self.clone();
        Ok(self.tracker.spawn(async move {
            let added = wishlist
                .backend()?
                .add_wishlist_item(&identity.token, &line)
                .await;
            let result = match added {
                Ok(remote) if wishlist.attach_remote_id(&identity, &key, remote.id) => {
                    wishlist.delete_remote(&identity, &key, remote.id).await
                }
                other => other.map(drop).map_err(SyncError::from),
            };
            wishlist.invalidate_remote(&identity).await;
            result
        }))
    }

    /// Take a product off the wishlist. Removing a missing product is not an
    /// error.
    ///
    /// Tombstoned like a cart line until the backend confirms the delete.
    pub fn remove(&self, entry: &WishlistRef) -> Reconciliation {
        let key = entry.key();
        add_breadcrumb("wishlist", "remove", Some(&[("key", key.as_str())]));

        let (remote, remote_id) = {
            let guard = self.ctx.lock();
            let removed = self.with_items(|items| items.shift_remove(&key));
            let existed = removed.is_some();
            let remote_id = removed.and_then(|item| item.remote_id).or(entry.remote_id);
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

        let wishlist = self.clone();
        self.tracker.spawn(async move {
            let result = wishlist.delete_remote(&identity, &key, remote_id).await;
            wishlist.invalidate_remote(&identity).await;
            result
        })
    }

    /// Empty the wishlist.
    pub fn clear(&self) -> Reconciliation {
        add_breadcrumb("wishlist", "clear", None);

        let (remote, keys) = {
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
            let keys: Vec<CompositeKey> = cleared.into_iter().map(|(key, _)| key).collect();
            (remote, keys)
        };

        let Some(identity) = remote else {
            return self.tracker.settled();
        };

        let wishlist = self.clone();
        self.tracker.spawn(async move {
            let result = wishlist.backend()?.clear_wishlist(&identity.token).await;
            if result.is_ok() {
                wishlist.settle_removal(&identity, &keys);
            }
            wishlist.invalidate_remote(&identity).await;
            result.map_err(SyncError::from)
        })
    }

    /// Pull the account's remote wishlist and merge it into the local one.
    ///
    /// Tombstoned entries are skipped and their delete retried.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationRequired` when no account is signed in, or the
    /// backend error of the (possibly shared) list request.
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

        let key = CacheKey::Wishlist(identity.email.canonical()).render();
        let value = self
            .ctx
            .cache
            .fetch(
                &key,
                || async {
                    backend
                        .list_wishlist(&identity.token)
                        .await
                        .map(|lines| CacheValue::Wishlist(Arc::new(lines)))
                },
                None,
            )
            .await?;

        let CacheValue::Wishlist(lines) = value else {
            return Err(SyncError::Internal(format!("unexpected cached value under {key}")));
        };

        let retries = {
            let guard = self.ctx.lock();
            if !self.ctx.is_active(&identity) {
                return Ok(());
            }

            let tombstoned = self.removed.keys();
            let mut listed = HashSet::new();
            let mut retries = Vec::new();
            self.with_items(|items| {
                for line in lines.iter() {
                    let remote = WishlistItem::from_remote(line);
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

        for (key, remote_id) in &retries {
            if let Err(e) = self.delete_remote(&identity, key, *remote_id).await {
                warn!(key = %key, error = %e, "Retrying removed wishlist entry failed");
            }
        }
        if !retries.is_empty() {
            self.invalidate_remote(&identity).await;
        }
        Ok(())
    }

    pub(crate) fn restore(&self, saved: SavedCollection<WishlistItem>) {
        let fresh = collect_items(saved.items.into_values());
        self.with_items(|items| *items = fresh);
        self.removed.restore(saved.removed);
    }

    pub(crate) fn saved(&self) -> SavedCollection<WishlistItem> {
        SavedCollection {
            items: self.with_items(|items| items.clone()),
            removed: self.removed.saved(),
        }
    }

    fn persist_locked(&self, guard: &MutexGuard<'_, ()>) {
        self.ctx.persist_locked(
            guard,
            keys::ANONYMOUS_WISHLIST,
            || self.saved(),
            |snapshot, saved| snapshot.wishlist = saved,
        );
    }

    /// Returns `true` when the entry was removed while its add was in flight.
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

    async fn delete_remote(
        &self,
        identity: &Identity,
        key: &CompositeKey,
        remote_id: RemoteLineId,
    ) -> Result<()> {
        self.backend()?
            .remove_wishlist_item(&identity.token, remote_id)
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
            .invalidate_pattern(&CacheKey::Wishlist(identity.email.canonical()).render())
            .await;
    }

    fn backend(&self) -> Result<&B> {
        self.ctx
            .backend
            .as_ref()
            .ok_or_else(|| SyncError::Internal("no backend configured".to_string()))
    }

    fn with_items<T>(&self, f: impl FnOnce(&mut IndexMap<CompositeKey, WishlistItem>) -> T) -> T {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut items)
    }
}
