//! Product categories.

use serde::{Deserialize, Serialize};

/// Error returned when a product type segment is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid product type: {0}")]
pub struct ProductTypeError(pub String);

/// Catalog category of a product.
///
/// The persisted and wire names are the storefront's category slugs, which
/// also form the first segment of every [`CompositeKey`](crate::CompositeKey).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductType {
    /// Bags have no size dimension.
    #[serde(rename = "bolsas")]
    Bags,
    #[serde(rename = "roupas")]
    Clothing,
    #[serde(rename = "calcados")]
    Shoes,
}

impl ProductType {
    /// Category assigned to entries from the single-category legacy cart.
    pub const LEGACY_DEFAULT: Self = Self::Clothing;

    /// All categories, in catalog order.
    pub const ALL: [Self; 3] = [Self::Bags, Self::Clothing, Self::Shoes];

    /// The category slug.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bags => "bolsas",
            Self::Clothing => "roupas",
            Self::Shoes => "calcados",
        }
    }

    /// Whether items of this category are sold in sizes.
    #[must_use]
    pub const fn is_sized(self) -> bool {
        !matches!(self, Self::Bags)
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductType {
    type Err = ProductTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bolsas" => Ok(Self::Bags),
            "roupas" => Ok(Self::Clothing),
            "calcados" => Ok(Self::Shoes),
            _ => Err(ProductTypeError(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_roundtrip() {
        for ty in ProductType::ALL {
            assert_eq!(ty.as_str().parse::<ProductType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_serde_uses_slug() {
        assert_eq!(
            serde_json::to_string(&ProductType::Shoes).unwrap(),
            "\"calcados\""
        );
        let parsed: ProductType = serde_json::from_str("\"bolsas\"").unwrap();
        assert_eq!(parsed, ProductType::Bags);
    }

    #[test]
    fn test_unknown_slug() {
        assert_eq!(
            "hats".parse::<ProductType>(),
            Err(ProductTypeError("hats".to_string()))
        );
    }

    #[test]
    fn test_legacy_default_is_clothing() {
        assert_eq!(ProductType::LEGACY_DEFAULT.as_str(), "roupas");
        assert!(!ProductType::Bags.is_sized());
    }
}
