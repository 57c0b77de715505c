//! Wire types exchanged with the commerce backend.

use serde::{Deserialize, Serialize};
use vitrine_core::{Price, ProductId, ProductType, RemoteLineId, SizeId};

/// A cart line as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartLine {
    pub id: RemoteLineId,
    pub product_id: ProductId,
    pub product_type: ProductType,
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
}

/// A wishlist line as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWishlistLine {
    pub id: RemoteLineId,
    pub product_id: ProductId,
    pub product_type: ProductType,
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
}

/// Body of an add-to-cart request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartLine {
    pub product_id: ProductId,
    pub product_type: ProductType,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_id: Option<SizeId>,
}

/// Body of an add-to-wishlist request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWishlistLine {
    pub product_id: ProductId,
    pub product_type: ProductType,
}

/// Body of a quantity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityUpdate {
    pub quantity: u32,
}
