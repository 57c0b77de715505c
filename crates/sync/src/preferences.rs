//! Size-standard preference per product.
//!
//! Sized products can show their size grid in Brazilian, US or European
//! numbering. The visitor's last choice is remembered per product id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vitrine_core::ProductId;

use crate::storage::{KeyValueStore, StorageError, keys, read_json, write_json};

/// Size numbering system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeStandard {
    #[default]
    Br,
    Us,
    Eu,
}

impl SizeStandard {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Br => "br",
            Self::Us => "us",
            Self::Eu => "eu",
        }
    }
}

impl std::fmt::Display for SizeStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SizeStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "br" => Ok(Self::Br),
            "us" => Ok(Self::Us),
            "eu" => Ok(Self::Eu),
            other => Err(format!("unknown size standard: {other}")),
        }
    }
}

/// Remembered size standards.
#[derive(Clone)]
pub struct SizePreferences {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SizePreferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizePreferences").finish_non_exhaustive()
    }
}

impl SizePreferences {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The remembered standard. Malformed values read as unset.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<SizeStandard> {
        read_json(self.store.as_ref(), &keys::size_standard(product_id))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set(&self, product_id: ProductId, standard: SizeStandard) -> Result<(), StorageError> {
        write_json(self.store.as_ref(), &keys::size_standard(product_id), &standard)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear(&self, product_id: ProductId) -> Result<(), StorageError> {
        self.store.remove(&keys::size_standard(product_id))
    }
}
