//! Composite line-item keys.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::{ProductId, SizeId};
use super::product::ProductType;

/// Errors that can occur when parsing a [`CompositeKey`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key does not have two or three `:`-separated segments.
    #[error("composite key must look like type:product or type:product:size, got {0:?}")]
    Malformed(String),
    /// The first segment is not a known product type.
    #[error(transparent)]
    ProductType(#[from] super::product::ProductTypeError),
    /// A numeric segment failed to parse.
    #[error("invalid id in composite key: {0}")]
    Id(#[from] core::num::ParseIntError),
}

/// Deterministic identity of a cart or wishlist line.
///
/// Items carrying a size key as `"type:product:size"`, items without one as
/// `"type:product"`. Two lines with the same key are the same line.
///
/// ```
/// use vitrine_core::{CompositeKey, ProductId, ProductType, SizeId};
///
/// let sized = CompositeKey::for_line(ProductType::Shoes, ProductId::new(12), Some(SizeId::new(38)));
/// assert_eq!(sized.as_str(), "calcados:12:38");
///
/// let unsized_bag = CompositeKey::for_line(ProductType::Bags, ProductId::new(3), None);
/// assert_eq!(unsized_bag.as_str(), "bolsas:3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    /// Key of a cart line.
    #[must_use]
    pub fn for_line(product_type: ProductType, product_id: ProductId, size_id: Option<SizeId>) -> Self {
        match size_id {
            Some(size) => Self(format!("{product_type}:{product_id}:{size}")),
            None => Self(format!("{product_type}:{product_id}")),
        }
    }

    /// Key of a wishlist line. Wishlists ignore sizes.
    #[must_use]
    pub fn for_wishlist(product_type: ProductType, product_id: ProductId) -> Self {
        Self::for_line(product_type, product_id, None)
    }

    /// Parse and validate a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has the wrong number of segments, an
    /// unknown product type, or a non-numeric id.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let mut parts = s.split(':');
        let (Some(ty), Some(product)) = (parts.next(), parts.next()) else {
            return Err(KeyError::Malformed(s.to_string()));
        };
        let size = parts.next();
        if parts.next().is_some() {
            return Err(KeyError::Malformed(s.to_string()));
        }

        let product_type: ProductType = ty.parse()?;
        let product_id = ProductId::new(product.parse()?);
        let size_id = size.map(str::parse).transpose()?.map(SizeId::new);

        Ok(Self::for_line(product_type, product_id, size_id))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl std::str::FromStr for CompositeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CompositeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
