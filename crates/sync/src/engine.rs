//! Engine context tying the aggregates to storage, session and backend.
//!
//! # Lifecycle
//!
//! 1. [`SyncEngine::new`] wires the collaborators; nothing is read yet.
//! 2. [`SyncEngine::init`] restores persisted state, imports the legacy cart
//!    and starts the cache sweep.
//! 3. [`SyncEngine::login`] / [`SyncEngine::logout`] swap the active
//!    collections between accounts.
//! 4. [`SyncEngine::teardown`] stops background work and drops cached reads.
//!
//! # Account switching
//!
//! Logging out saves the outgoing account's collections to its snapshot and
//! leaves the visitor with empty, anonymous collections. Logging in replaces
//! the collections with the incoming account's snapshot, or with empty ones
//! when it has none; anything collected anonymously is dropped rather than
//! attributed to the account.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::backend::CommerceBackend;
use crate::cache::{CacheValue, DedupCache};
use crate::cart::{Cart, CartItem};
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::legacy::{LegacyMigration, migrate_legacy_cart};
use crate::preferences::SizePreferences;
use crate::reconcile::Reconciliation;
use crate::session::{AuthState, Identity};
use crate::snapshot::{AccountSnapshot, AccountSnapshotStore, SavedCollection};
use crate::storage::{KeyValueStore, keys, read_json};
use crate::wishlist::{Wishlist, WishlistItem};

/// Cart and wishlist synchronization engine.
///
/// Cheap to clone; clones share state.
pub struct SyncEngine<B> {
    inner: Arc<EngineInner<B>>,
}

struct EngineInner<B> {
    ctx: Arc<SyncContext<B>>,
    cart: Cart<B>,
    wishlist: Wishlist<B>,
    preferences: SizePreferences,
    sweep_interval: Duration,
    initialized: AtomicBool,
}

impl<B> Clone for SyncEngine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CommerceBackend> SyncEngine<B> {
    /// Create an engine over `store`. Without a backend it runs local-only.
    #[must_use]
    pub fn new(config: &SyncConfig, store: Arc<dyn KeyValueStore>, backend: Option<B>) -> Self {
        let ctx = Arc::new(SyncContext::new(config, Arc::clone(&store), backend));

        Self {
            inner: Arc::new(EngineInner {
                cart: Cart::new(Arc::clone(&ctx)),
                wishlist: Wishlist::new(Arc::clone(&ctx)),
                preferences: SizePreferences::new(store),
                sweep_interval: config.cache.sweep_interval,
                initialized: AtomicBool::new(false),
                ctx,
            }),
        }
    }

    /// Restore persisted collections, import the legacy cart once, and start
    /// the cache sweep when a tokio runtime is available.
    ///
    /// Later calls do nothing.
    pub fn init(&self) -> LegacyMigration {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return LegacyMigration {
                entries: 0,
                reconciliation: Reconciliation::settled(),
            };
        }

        let ctx = &self.inner.ctx;
        {
            let _guard = ctx.lock();
            match ctx.auth.identity() {
                Some(identity) => self.load_account(&identity.email.canonical()),
                None => {
                    let store = ctx.store.as_ref();
                    let cart: SavedCollection<CartItem> =
                        read_json(store, keys::ANONYMOUS_CART).unwrap_or_default();
                    let wishlist: SavedCollection<WishlistItem> =
                        read_json(store, keys::ANONYMOUS_WISHLIST).unwrap_or_default();
                    self.inner.cart.restore(cart);
                    self.inner.wishlist.restore(wishlist);
                }
            }
        }

        let migration = migrate_legacy_cart(ctx.store.as_ref(), &self.inner.cart);

        if tokio::runtime::Handle::try_current().is_ok() {
            ctx.cache.spawn_sweeper(self.inner.sweep_interval);
        } else {
            debug!("No async runtime, cache sweep disabled");
        }

        info!(
            cart = self.inner.cart.len(),
            wishlist = self.inner.wishlist.len(),
            legacy_entries = migration.entries,
            "Sync engine initialized"
        );
        migration
    }

    /// Make `identity` the active account.
    ///
    /// Signing in again as the active account only refreshes its token.
    /// The whole switch happens under the persistence lock, so a
    /// reconciliation of the outgoing account cannot write into the incoming
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error if the outgoing account's snapshot cannot be saved;
    /// the switch is not performed in that case.
    #[instrument(skip_all, fields(email = %identity.email))]
    pub fn login(&self, identity: Identity) -> Result<()> {
        let ctx = &self.inner.ctx;
        let incoming = identity.email.canonical();
        let guard = ctx.lock();

        if let Some(current) = ctx.auth.identity() {
            if current.email.canonical() == incoming {
                ctx.auth.set_identity(identity);
                return Ok(());
            }
            self.save_account(&current)?;
        }

        ctx.auth.set_identity(identity);
        self.load_account(&incoming);
        self.clear_anonymous_slots();
        drop(guard);

        set_sentry_user(&incoming);
        info!(
            cart = self.inner.cart.len(),
            wishlist = self.inner.wishlist.len(),
            "Account activated"
        );
        Ok(())
    }

    /// Save the active account's collections and return to an empty
    /// anonymous state. Does nothing when no account is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be saved; the account stays
    /// active in that case.
    #[instrument(skip_all)]
    pub fn logout(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        let guard = ctx.lock();
        let Some(outgoing) = ctx.auth.identity() else {
            return Ok(());
        };

        self.save_account(&outgoing)?;
        ctx.auth.clear();
        self.inner.cart.restore(SavedCollection::default());
        self.inner.wishlist.restore(SavedCollection::default());
        self.clear_anonymous_slots();
        drop(guard);

        clear_sentry_user();
        info!(email = %outgoing.email, "Account deactivated");
        Ok(())
    }

    /// Delete everything stored for `email`.
    ///
    /// When `email` is the active account its collections are emptied too.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be deleted.
    pub fn clear_account_data(&self, email: &str) -> Result<()> {
        let _guard = self.inner.ctx.lock();
        self.inner.ctx.snapshots.clear(email)?;

        let target = email.trim().to_lowercase();
        let active = self
            .inner
            .ctx
            .auth
            .identity()
            .is_some_and(|identity| identity.email.canonical() == target);
        if active {
            self.inner.cart.restore(SavedCollection::default());
            self.inner.wishlist.restore(SavedCollection::default());
        }
        Ok(())
    }

    /// Stop the cache sweep and drop all cached reads.
    pub async fn teardown(&self) {
        self.inner.ctx.cache.teardown().await;
        self.inner.initialized.store(false, Ordering::SeqCst);
        debug!("Sync engine torn down");
    }

    #[must_use]
    pub fn cart(&self) -> &Cart<B> {
        &self.inner.cart
    }

    #[must_use]
    pub fn wishlist(&self) -> &Wishlist<B> {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn session(&self) -> &AuthState {
        &self.inner.ctx.auth
    }

    #[must_use]
    pub fn cache(&self) -> &DedupCache<CacheValue> {
        &self.inner.ctx.cache
    }

    #[must_use]
    pub fn preferences(&self) -> &SizePreferences {
        &self.inner.preferences
    }

    #[must_use]
    pub fn snapshots(&self) -> &AccountSnapshotStore {
        &self.inner.ctx.snapshots
    }

    fn save_account(&self, identity: &Identity) -> Result<()> {
        let snapshot = AccountSnapshot {
            cart: self.inner.cart.saved(),
            wishlist: self.inner.wishlist.saved(),
            saved_at: None,
        };
        self.inner
            .ctx
            .snapshots
            .save(identity.email.as_str(), &snapshot)?;
        Ok(())
    }

    fn load_account(&self, email: &str) {
        let snapshot = self.inner.ctx.snapshots.load(email).unwrap_or_default();
        self.inner.cart.restore(snapshot.cart);
        self.inner.wishlist.restore(snapshot.wishlist);
    }

    fn clear_anonymous_slots(&self) {
        let store = self.inner.ctx.store.as_ref();
        for key in [keys::ANONYMOUS_CART, keys::ANONYMOUS_WISHLIST] {
            if let Err(e) = store.remove(key) {
                warn!(key, error = %e, "Failed to clear anonymous slot");
            }
        }
    }
}
