//! REST implementation of [`CommerceBackend`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;
use vitrine_core::RemoteLineId;

use super::{
    BackendError, CommerceBackend, NewCartLine, NewWishlistLine, QuantityUpdate, RemoteCartLine,
    RemoteWishlistLine,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const BODY_LOG_LIMIT: usize = 500;

/// Client for the commerce backend's cart and wishlist endpoints.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpBackend {
    inner: Arc<HttpBackendInner>,
}

struct HttpBackendInner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &Url) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpBackendInner {
                client,
                endpoint: base_url.as_str().trim_end_matches('/').to_string(),
            }),
        })
    }

    fn request(&self, method: Method, path: &str, token: &SecretString) -> RequestBuilder {
        self.inner
            .client
            .request(method, format!("{}/{path}", self.inner.endpoint))
            .bearer_auth(token.expose_secret())
    }

    /// Send a request and decode a JSON body.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(BODY_LOG_LIMIT).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Send a request and return the raw body of a success response.
    async fn send(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }

        let url = response.url().path().to_string();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(url));
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(BODY_LOG_LIMIT).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }
}

impl CommerceBackend for HttpBackend {
    #[instrument(skip_all)]
    async fn list_cart(&self, token: &SecretString) -> Result<Vec<RemoteCartLine>, BackendError> {
        self.execute(self.request(Method::GET, "cart/items", token))
            .await
    }

    #[instrument(skip(self, token), fields(product_id = %line.product_id))]
    async fn add_cart_item(
        &self,
        token: &SecretString,
        line: &NewCartLine,
    ) -> Result<RemoteCartLine, BackendError> {
        let request = self.request(Method::POST, "cart/items", token).json(line);
        self.execute(request).await
    }

    #[instrument(skip(self, token), fields(id = %id))]
    async fn update_cart_quantity(
        &self,
        token: &SecretString,
        id: RemoteLineId,
        quantity: u32,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::PATCH, &format!("cart/items/{id}"), token)
            .json(&QuantityUpdate { quantity });
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, token), fields(id = %id))]
    async fn remove_cart_item(
        &self,
        token: &SecretString,
        id: RemoteLineId,
    ) -> Result<(), BackendError> {
        self.send(self.request(Method::DELETE, &format!("cart/items/{id}"), token))
            .await
            .map(drop)
    }

    #[instrument(skip_all)]
    async fn clear_cart(&self, token: &SecretString) -> Result<(), BackendError> {
        self.send(self.request(Method::DELETE, "cart/items", token))
            .await
            .map(drop)
    }

    #[instrument(skip_all)]
    async fn list_wishlist(
        &self,
        token: &SecretString,
    ) -> Result<Vec<RemoteWishlistLine>, BackendError> {
        self.execute(self.request(Method::GET, "wishlist/items", token))
            .await
    }

    #[instrument(skip(self, token), fields(product_id = %line.product_id))]
    async fn add_wishlist_item(
        &self,
        token: &SecretString,
        line: &NewWishlistLine,
    ) -> Result<RemoteWishlistLine, BackendError> {
        let request = self.request(Method::POST, "wishlist/items", token).json(line);
        self.execute(request).await
    }

    #[instrument(skip(self, token), fields(id = %id))]
    async fn remove_wishlist_item(
        &self,
        token: &SecretString,
        id: RemoteLineId,
    ) -> Result<(), BackendError> {
        self.send(self.request(Method::DELETE, &format!("wishlist/items/{id}"), token))
            .await
            .map(drop)
    }

    #[instrument(skip_all)]
    async fn clear_wishlist(&self, token: &SecretString) -> Result<(), BackendError> {
        self.send(self.request(Method::DELETE, "wishlist/items", token))
            .await
            .map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_drops_trailing_slash() {
        let backend = HttpBackend::new(&Url::parse("https://api.example.com/v1/").unwrap()).unwrap();
        assert_eq!(backend.inner.endpoint, "https://api.example.com/v1");
    }

    #[test]
    fn test_request_targets_endpoint_path() {
        let backend = HttpBackend::new(&Url::parse("https://api.example.com/v1").unwrap()).unwrap();
        let token = SecretString::from("tok");
        let request = backend
            .request(Method::DELETE, "cart/items/12", &token)
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/v1/cart/items/12"
        );
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer tok"
        );
    }
}
