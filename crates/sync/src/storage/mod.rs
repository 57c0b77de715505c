//! Persisted client state behind a small key-value port.
//!
//! Everything the engine keeps between runs (anonymous cart and wishlist,
//! the legacy cart, per-account snapshots, size-standard preferences) goes
//! through [`KeyValueStore`]. Two adapters ship with the crate:
//!
//! - [`MemoryStore`] - process-local map, used by tests
//! - [`FileStore`] - one file per key under a directory
//!
//! # Concurrency
//!
//! There is no locking across processes. Every key is namespaced either to
//! the anonymous slot or to one account, so writers for different accounts
//! never collide; two writers for the same account race and the last write
//! wins.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Errors raised by a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized before writing.
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An in-process lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// String key-value storage, the shape of browser local storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List all stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

/// Logical storage keys.
pub mod keys {
    use vitrine_core::ProductId;

    /// Cart of the visitor when no account is active.
    pub const ANONYMOUS_CART: &str = "vitrine:cart";

    /// Wishlist of the visitor when no account is active.
    pub const ANONYMOUS_WISHLIST: &str = "vitrine:wishlist";

    /// Flat cart written by the single-category storefront. Migrated once,
    /// then deleted.
    pub const LEGACY_CART: &str = "cart";

    /// Prefix of per-account snapshot keys.
    pub const ACCOUNT_PREFIX: &str = "vitrine:account:";

    /// Prefix of per-product size-standard preference keys.
    pub const SIZE_STANDARD_PREFIX: &str = "vitrine:size-standard:";

    /// Snapshot key for an already-canonicalized email.
    #[must_use]
    pub fn account_snapshot(canonical_email: &str) -> String {
        format!("{ACCOUNT_PREFIX}{canonical_email}")
    }

    /// Size-standard preference key for a product.
    #[must_use]
    pub fn size_standard(product_id: ProductId) -> String {
        format!("{SIZE_STANDARD_PREFIX}{product_id}")
    }
}

/// Read and decode a JSON value, treating every failure as absence.
///
/// Unreadable storage and malformed JSON are logged and reported as `None`;
/// persisted state is never allowed to crash the caller.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring malformed persisted state");
            None
        }
    }
}

/// Encode a value as JSON and write it.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_uses_prefix() {
        assert_eq!(keys::account_snapshot("a@x.com"), "vitrine:account:a@x.com");
    }

    #[test]
    fn test_read_json_absorbs_malformed_values() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        assert_eq!(read_json::<Vec<i32>>(&store, "k"), None);
        assert_eq!(read_json::<Vec<i32>>(&store, "missing"), None);
    }

    #[test]
    fn test_write_then_read_json() {
        let store = MemoryStore::new();
        write_json(&store, "k", &vec![1, 2, 3]).unwrap();
        assert_eq!(read_json::<Vec<i32>>(&store, "k"), Some(vec![1, 2, 3]));
    }
}
