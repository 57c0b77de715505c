//! Vitrine cart and wishlist synchronization engine.
//!
//! Keeps a cart and a wishlist consistent across the anonymous visitor's
//! persisted state, the commerce backend of a signed-in account, and several
//! accounts sharing one browser profile.
//!
//! # Modules
//!
//! - [`engine`] - [`SyncEngine`], the context object owning everything below
//! - [`cart`] / [`wishlist`] - Optimistic aggregates with backend reconciliation
//! - [`snapshot`] - Per-account persisted collections
//! - [`legacy`] - One-time import of the single-category cart
//! - [`cache`] - TTL cache sharing in-flight reads
//! - [`storage`] - Key-value port with memory and file adapters
//! - [`backend`] - Commerce backend trait and REST client

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cache;
pub mod cart;
pub mod config;
mod context;
pub mod engine;
pub mod error;
pub mod legacy;
pub mod preferences;
pub mod reconcile;
pub mod session;
pub mod snapshot;
pub mod storage;
mod tombstone;
pub mod wishlist;

pub use cart::{AddToCart, Cart, CartItem, LineRef};
pub use config::{GuestPolicy, SyncConfig};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use reconcile::Reconciliation;
pub use session::{AuthState, Identity};
pub use wishlist::{AddToWishlist, Wishlist, WishlistItem, WishlistRef};
