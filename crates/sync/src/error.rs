//! Unified error handling with Sentry integration.
//!
//! [`SyncError`] is what every cart and wishlist intent reports. The local
//! optimistic mutation has already happened by the time a backend failure is
//! reported; errors describe convergence, never the user-visible state.

use std::sync::Arc;

use thiserror::Error;
use vitrine_core::CompositeKey;

use crate::backend::BackendError;
use crate::storage::StorageError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The intent requires an authenticated account. Raised before any
    /// local mutation.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Backend reconciliation failed. Shared because a deduplicated read
    /// delivers one failure to every waiting caller.
    #[error("Backend error: {0}")]
    Backend(#[source] Arc<BackendError>),

    /// Requested quantity was zero.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The referenced line is not in the collection.
    #[error("Not in collection: {0}")]
    NotFound(CompositeKey),

    /// Persisted storage could not be written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A reconciliation task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the user may simply retry the intent.
    ///
    /// Authentication prompts and invalid input are not retryable; backend
    /// and transport failures are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(err) => err.is_transient(),
            Self::Storage(_) | Self::Internal(_) => true,
            Self::AuthenticationRequired | Self::InvalidQuantity | Self::NotFound(_) => false,
        }
    }

    /// Message suitable for a dismissible notification.
    ///
    /// Internal details stay out of the message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationRequired => "Please sign in to continue".to_string(),
            Self::InvalidQuantity => "Quantity must be at least 1".to_string(),
            Self::NotFound(_) => "That item is no longer in your list".to_string(),
            Self::Backend(_) | Self::Storage(_) | Self::Internal(_) => {
                "We couldn't sync your changes. Please try again".to_string()
            }
        }
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        Self::Backend(Arc::new(err))
    }
}

impl From<Arc<BackendError>> for SyncError {
    fn from(err: Arc<BackendError>) -> Self {
        Self::Backend(err)
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Set the Sentry user context from the active account.
///
/// Call this when an identity becomes active to associate errors with it.
pub fn set_sentry_user(email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the account.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a cart or wishlist intent.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "add", Some(&[("key", "roupas:5:2")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::AuthenticationRequired;
        assert_eq!(err.to_string(), "Authentication required");

        let err = SyncError::from(BackendError::NotFound("cart".to_string()));
        assert_eq!(err.to_string(), "Backend error: Not found: cart");
    }

    #[test]
    fn test_auth_required_is_distinct_from_network_errors() {
        assert!(!SyncError::AuthenticationRequired.is_retryable());
        assert!(SyncError::from(BackendError::RateLimited(5)).is_retryable());
        assert_ne!(
            SyncError::AuthenticationRequired.user_message(),
            SyncError::from(BackendError::RateLimited(5)).user_message()
        );
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = SyncError::Internal("task panicked at cart.rs:42".to_string());
        assert!(!err.user_message().contains("cart.rs"));
    }

    #[test]
    fn test_breadcrumb_without_client_is_noop() {
        add_breadcrumb("cart", "add", Some(&[("key", "roupas:5")]));
        set_sentry_user("a@x.com");
        clear_sentry_user();
    }
}
