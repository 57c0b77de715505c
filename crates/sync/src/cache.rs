//! Read-through cache that collapses concurrent identical requests.
//!
//! Built on `moka`:
//! - a fresh entry is returned without calling the producer
//! - concurrent misses on one key share a single producer call
//!   (`try_get_with`), and every waiter receives the same value or error
//! - failures are never cached
//! - each entry carries its own TTL (default 30 seconds)
//!
//! # Invalidation
//!
//! Entries are stored under `(key, generation)`. Invalidating a key bumps its
//! generation, so the next fetch starts a new producer call even while an
//! older one is still in flight; the late result lands in a slot nobody reads
//! and expires on its own. Generation counters are kept for every key ever
//! fetched. Keys are per-account list names, so the map stays small.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::{RemoteCartLine, RemoteWishlistLine};
use crate::config::CacheConfig;

/// Cache key for remote list reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    /// Remote cart of an account, by canonical email.
    Cart(String),
    /// Remote wishlist of an account, by canonical email.
    Wishlist(String),
}

impl CacheKey {
    /// Prefix shared by every cart key, for pattern invalidation.
    pub const CART_PREFIX: &'static str = "cart:";
    /// Prefix shared by every wishlist key, for pattern invalidation.
    pub const WISHLIST_PREFIX: &'static str = "wishlist:";

    /// String form used as the cache key.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Cart(account) => format!("{}{account}", Self::CART_PREFIX),
            Self::Wishlist(account) => format!("{}{account}", Self::WISHLIST_PREFIX),
        }
    }
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Cart(Arc<Vec<RemoteCartLine>>),
    Wishlist(Arc<Vec<RemoteWishlistLine>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Slot {
    key: String,
    generation: u64,
}

#[derive(Clone)]
struct Entry<V> {
    data: V,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct EntryTtl;

impl<V> Expiry<Slot, Entry<V>> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &Slot,
        value: &Entry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Keyed TTL cache with in-flight request sharing.
///
/// Cheap to clone; clones share entries.
#[derive(Clone)]
pub struct DedupCache<V> {
    inner: Arc<DedupCacheInner<V>>,
}

struct DedupCacheInner<V> {
    entries: Cache<Slot, Entry<V>>,
    generations: Mutex<HashMap<String, u64>>,
    default_ttl: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> DedupCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.capacity)
            .expire_after(EntryTtl)
            .build();

        Self {
            inner: Arc::new(DedupCacheInner {
                entries,
                generations: Mutex::new(HashMap::new()),
                default_ttl: config.ttl,
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Return the cached value for `key`, or run `producer` to obtain it.
    ///
    /// `ttl` overrides the default freshness window for the stored entry.
    ///
    /// # Errors
    ///
    /// Returns the producer's error. Concurrent callers that joined the same
    /// in-flight call all receive that same error; nothing is cached.
    pub async fn fetch<F, Fut, E>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
    ) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Send + Sync + 'static,
    {
        let slot = self.slot(key);

        if let Some(entry) = self.inner.entries.get(&slot).await {
            debug!(key, "Cache hit");
            return Ok(entry.data);
        }

        let ttl = ttl.unwrap_or(self.inner.default_ttl);
        let entry = self
            .inner
            .entries
            .try_get_with(slot, async move {
                debug!(key, "Cache miss, invoking producer");
                producer().await.map(|data| Entry { data, ttl })
            })
            .await?;

        Ok(entry.data)
    }

    /// Drop the entry for `key` and detach any in-flight call from it.
    pub async fn invalidate(&self, key: &str) {
        let stale = {
            let mut generations = self.generations();
            generations.get_mut(key).map(|generation| {
                let old = *generation;
                *generation += 1;
                Slot {
                    key: key.to_string(),
                    generation: old,
                }
            })
        };

        if let Some(slot) = stale {
            self.inner.entries.invalidate(&slot).await;
        }
    }

    /// Invalidate every key containing `pattern`.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        let stale: Vec<Slot> = {
            let mut generations = self.generations();
            generations
                .iter_mut()
                .filter(|(key, _)| key.contains(pattern))
                .map(|(key, generation)| {
                    let old = *generation;
                    *generation += 1;
                    Slot {
                        key: key.clone(),
                        generation: old,
                    }
                })
                .collect()
        };

        debug!(pattern, count = stale.len(), "Invalidating cache keys");
        for slot in stale {
            self.inner.entries.invalidate(&slot).await;
        }
    }

    /// Invalidate everything.
    pub async fn clear(&self) {
        for generation in self.generations().values_mut() {
            *generation += 1;
        }
        self.inner.entries.invalidate_all();
        self.inner.entries.run_pending_tasks().await;
    }

    /// Evict expired entries now.
    pub async fn sweep(&self) {
        self.inner.entries.run_pending_tasks().await;
    }

    /// Number of stored entries, as of the last sweep.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entries.entry_count()
    }

    /// Start the periodic sweep on the current tokio runtime.
    ///
    /// Replaces any sweep started earlier.
    pub fn spawn_sweeper(&self, interval: Duration) {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        });

        let previous = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the sweep and drop every entry.
    pub async fn teardown(&self) {
        let handle = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.clear().await;
    }

    fn slot(&self, key: &str) -> Slot {
        let generation = *self.generations().entry(key.to_string()).or_insert(0);
        Slot {
            key: key.to_string(),
            generation,
        }
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // Counters only, so a poisoned lock still holds valid data.
        self.inner
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
