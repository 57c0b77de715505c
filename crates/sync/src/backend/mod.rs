//! Commerce backend collaborator.
//!
//! # Architecture
//!
//! - The backend owns the account's remote cart and wishlist
//! - The engine talks to it only through [`CommerceBackend`]
//! - [`HttpBackend`] is the production implementation (REST over `reqwest`)
//!
//! Every operation is keyed by the account session token. Mutations are
//! fire-and-converge: the engine has already applied them locally before a
//! backend call starts, so a failure here never undoes user-visible state.

mod http;
pub mod types;

pub use http::HttpBackend;
pub use types::*;

use std::future::Future;

use secrecy::SecretString;
use thiserror::Error;
use vitrine_core::RemoteLineId;

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Session token was rejected.
    #[error("Session rejected by backend")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
}

impl BackendError {
    /// Whether repeating the same request later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Parse(_) | Self::Unauthorized | Self::NotFound(_) => false,
        }
    }
}

/// Remote cart and wishlist operations of one account.
pub trait CommerceBackend: Send + Sync + 'static {
    /// List the account's cart lines.
    fn list_cart(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<Vec<RemoteCartLine>, BackendError>> + Send;

    /// Add a line (or more units of an existing one) to the cart.
    fn add_cart_item(
        &self,
        token: &SecretString,
        line: &NewCartLine,
    ) -> impl Future<Output = Result<RemoteCartLine, BackendError>> + Send;

    /// Set the quantity of a stored cart line.
    fn update_cart_quantity(
        &self,
        token: &SecretString,
        id: RemoteLineId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete a stored cart line.
    fn remove_cart_item(
        &self,
        token: &SecretString,
        id: RemoteLineId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete every cart line of the account.
    fn clear_cart(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// List the account's wishlist lines.
    fn list_wishlist(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<Vec<RemoteWishlistLine>, BackendError>> + Send;

    /// Add a product to the wishlist.
    fn add_wishlist_item(
        &self,
        token: &SecretString,
        line: &NewWishlistLine,
    ) -> impl Future<Output = Result<RemoteWishlistLine, BackendError>> + Send;

    /// Delete a stored wishlist line.
    fn remove_wishlist_item(
        &self,
        token: &SecretString,
        id: RemoteLineId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete every wishlist line of the account.
    fn clear_wishlist(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotFound("cart line 9".to_string());
        assert_eq!(err.to_string(), "Not found: cart line 9");

        let err = BackendError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");

        let err = BackendError::Status {
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::RateLimited(1).is_transient());
        assert!(
            BackendError::Status {
                status: 502,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !BackendError::Status {
                status: 422,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!BackendError::Unauthorized.is_transient());
    }
}
