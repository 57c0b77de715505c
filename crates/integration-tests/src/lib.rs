//! Integration test support for the Vitrine sync engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vitrine-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - Cart intents reaching the backend, cached reads
//! - `durability` - Local state surviving backend failures
//! - `accounts` - Login, logout and account switching
//! - `legacy_import` - Legacy cart import
//! - `persistence` - File-backed state across engine restarts
//! - `tombstones` - Removed lines surviving refreshes until deleted remotely
//! - `concurrency` - Intents racing each other and account switches
//!
//! Everything runs against [`FakeBackend`]; no network is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use vitrine_core::{Email, RemoteLineId};
use vitrine_sync::backend::{
    BackendError, CommerceBackend, NewCartLine, NewWishlistLine, RemoteCartLine,
    RemoteWishlistLine,
};
use vitrine_sync::config::{CacheConfig, GuestPolicy, SyncConfig};
use vitrine_sync::storage::{KeyValueStore, MemoryStore};
use vitrine_sync::{Identity, SyncEngine};

/// Token every test identity signs in with.
pub const TEST_TOKEN: &str = "test-session-token";

/// Backend calls, counted per operation.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub list_cart: AtomicUsize,
    pub add_cart_item: AtomicUsize,
    pub update_cart_quantity: AtomicUsize,
    pub remove_cart_item: AtomicUsize,
    pub clear_cart: AtomicUsize,
    pub list_wishlist: AtomicUsize,
    pub add_wishlist_item: AtomicUsize,
    pub remove_wishlist_item: AtomicUsize,
    pub clear_wishlist: AtomicUsize,
}

#[derive(Debug, Default)]
struct Lines {
    next_id: i32,
    cart: Vec<RemoteCartLine>,
    wishlist: Vec<RemoteWishlistLine>,
}

impl Lines {
    fn next_id(&mut self) -> RemoteLineId {
        self.next_id += 1;
        RemoteLineId::new(self.next_id)
    }
}

/// In-memory commerce backend for a single account.
///
/// Clones share state, so a test can keep a handle after giving one to the
/// engine.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    lines: Arc<Mutex<Lines>>,
    calls: Arc<CallCounts>,
    failing: Arc<AtomicBool>,
    latency: Duration,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every following call fail with a 503 until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Store a cart line as if another device had added it.
    pub fn seed_cart(&self, line: &NewCartLine) -> RemoteCartLine {
        self.with_lines(|lines| insert_cart_line(lines, line))
    }

    /// Store a wishlist line as if another device had added it.
    pub fn seed_wishlist(&self, line: &NewWishlistLine) -> RemoteWishlistLine {
        self.with_lines(|lines| insert_wishlist_line(lines, line))
    }

    #[must_use]
    pub fn cart_lines(&self) -> Vec<RemoteCartLine> {
        self.with_lines(|lines| lines.cart.clone())
    }

    #[must_use]
    pub fn wishlist_lines(&self) -> Vec<RemoteWishlistLine> {
        self.with_lines(|lines| lines.wishlist.clone())
    }

    fn with_lines<R>(&self, f: impl FnOnce(&mut Lines) -> R) -> R {
        let mut guard = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    async fn call(&self, counter: &AtomicUsize, token: &SecretString) -> Result<(), BackendError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if token.expose_secret() != TEST_TOKEN {
            return Err(BackendError::Unauthorized);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn insert_cart_line(lines: &mut Lines, line: &NewCartLine) -> RemoteCartLine {
    let existing = lines.cart.iter_mut().find(|stored| {
        stored.product_id == line.product_id
            && stored.product_type == line.product_type
            && stored.size_id == line.size_id
    });
    if let Some(stored) = existing {
        stored.quantity += line.quantity;
        return stored.clone();
    }

    let stored = RemoteCartLine {
        id: lines.next_id(),
        product_id: line.product_id,
        product_type: line.product_type,
        quantity: line.quantity,
        size_id: line.size_id,
        title: None,
        subtitle: None,
        description: None,
        image_url: None,
        unit_price: None,
    };
    lines.cart.push(stored.clone());
    stored
}

fn insert_wishlist_line(lines: &mut Lines, line: &NewWishlistLine) -> RemoteWishlistLine {
    let existing = lines
        .wishlist
        .iter()
        .find(|stored| stored.product_id == line.product_id && stored.product_type == line.product_type);
    if let Some(stored) = existing {
        return stored.clone();
    }

    let stored = RemoteWishlistLine {
        id: lines.next_id(),
        product_id: line.product_id,
        product_type: line.product_type,
        title: None,
        subtitle: None,
        description: None,
        image_url: None,
        unit_price: None,
    };
    lines.wishlist.push(stored.clone());
    stored
}

impl CommerceBackend for FakeBackend {
    async fn list_cart(&self, token: &SecretString) -> Result<Vec<RemoteCartLine>, BackendError> {
        self.call(&self.calls.list_cart, token).await?;
        Ok(self.cart_lines())
    }

    async fn add_cart_item(
        &self,
        token: &SecretString,
        line: &NewCartLine,
    ) -> Result<RemoteCartLine, BackendError> {
        self.call(&self.calls.add_cart_item, token).await?;
        Ok(self.seed_cart(line))
    }

    async fn update_cart_quantity(
        &self,
        token: &SecretString,
        id: RemoteLineId,
        quantity: u32,
    ) -> Result<(), BackendError> {
        self.call(&self.calls.update_cart_quantity, token).await?;
        self.with_lines(|lines| {
            let stored = lines
                .cart
                .iter_mut()
                .find(|stored| stored.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("cart line {id}")))?;
            stored.quantity = quantity;
            Ok(())
        })
    }

    async fn remove_cart_item(
        &self,
        token: &SecretString,
        id: RemoteLineId,
    ) -> Result<(), BackendError> {
        self.call(&self.calls.remove_cart_item, token).await?;
        self.with_lines(|lines| lines.cart.retain(|stored| stored.id != id));
        Ok(())
    }

    async fn clear_cart(&self, token: &SecretString) -> Result<(), BackendError> {
        self.call(&self.calls.clear_cart, token).await?;
        self.with_lines(|lines| lines.cart.clear());
        Ok(())
    }

    async fn list_wishlist(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteWishlistLine>, BackendError> {
        self.call(&self.calls.list_wishlist, token).await?;
        Ok(self.wishlist_lines())
    }

    async fn add_wishlist_item(
        &self,
        token: &SecretString,
        line: &NewWishlistLine,
    ) -> Result<RemoteWishlistLine, BackendError> {
        self.call(&self.calls.add_wishlist_item, token).await?;
        Ok(self.seed_wishlist(line))
    }

    async fn remove_wishlist_item(
        &self,
        token: &SecretString,
        id: RemoteLineId,
    ) -> Result<(), BackendError> {
        self.call(&self.calls.remove_wishlist_item, token).await?;
        self.with_lines(|lines| lines.wishlist.retain(|stored| stored.id != id));
        Ok(())
    }

    async fn clear_wishlist(&self, token: &SecretString) -> Result<(), BackendError> {
        self.call(&self.calls.clear_wishlist, token).await?;
        self.with_lines(|lines| lines.wishlist.clear());
        Ok(())
    }
}

/// Read a call counter.
#[must_use]
pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Configuration with a long cache window and the given guest policy.
#[must_use]
pub fn test_config(guest_policy: GuestPolicy) -> SyncConfig {
    SyncConfig {
        cache: CacheConfig {
            ttl: Duration::from_secs(60),
            capacity: 100,
            sweep_interval: Duration::from_secs(60),
        },
        guest_policy,
        ..SyncConfig::default()
    }
}

/// Identity for `email` carrying [`TEST_TOKEN`].
///
/// # Panics
///
/// Panics if `email` is not a valid address.
#[must_use]
#[allow(clippy::expect_used)]
pub fn identity(email: &str) -> Identity {
    let email = Email::parse(email).expect("test email must be valid");
    Identity::new(email, SecretString::from(TEST_TOKEN))
}

/// Engine over a fresh in-memory store and `backend`.
#[must_use]
pub fn engine(
    guest_policy: GuestPolicy,
    backend: &FakeBackend,
) -> (SyncEngine<FakeBackend>, Arc<dyn KeyValueStore>) {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = SyncEngine::new(
        &test_config(guest_policy),
        Arc::clone(&store),
        Some(backend.clone()),
    );
    (engine, store)
}
