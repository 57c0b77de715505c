//! Vitrine Core - Shared types library.
//!
//! This crate provides the domain vocabulary used by every Vitrine component:
//! - `sync` - Cart and wishlist synchronization engine
//! - `cli` - Command-line front end over the engine
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, product types, composite keys,
//!   prices, and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
