//! Core types for Vitrine.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod key;
pub mod price;
pub mod product;

pub use email::{Email, EmailError};
pub use id::*;
pub use key::{CompositeKey, KeyError};
pub use price::Price;
pub use product::{ProductType, ProductTypeError};
