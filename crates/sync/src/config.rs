//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `VITRINE_API_URL` - Commerce backend base URL. Without it the engine
//!   runs local-only.
//! - `VITRINE_STORAGE_DIR` - Directory for persisted state (default: `.vitrine`)
//! - `VITRINE_CACHE_TTL_MS` - Freshness window of cached reads (default: 30000)
//! - `VITRINE_CACHE_CAPACITY` - Maximum cached reads (default: 1000)
//! - `VITRINE_CACHE_SWEEP_MS` - Interval of the expired-entry sweep (default: 60000)
//! - `VITRINE_GUEST_CART` - `true` lets anonymous visitors add items (default: false)
//! - `VITRINE_SESSION_EMAIL` / `VITRINE_SESSION_TOKEN` - Signed-in account;
//!   both or neither
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;
use vitrine_core::Email;

use crate::session::Identity;

const DEFAULT_STORAGE_DIR: &str = ".vitrine";
const DEFAULT_CACHE_TTL_MS: u64 = 30_000;
const DEFAULT_CACHE_CAPACITY: u64 = 1_000;
const DEFAULT_CACHE_SWEEP_MS: u64 = 60_000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Whether visitors without an account may add to their cart and wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuestPolicy {
    /// Anonymous visitors accumulate items locally.
    Allow,
    /// Adding items prompts for authentication first.
    #[default]
    RequireLogin,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Commerce backend base URL
    pub api_url: Option<Url>,
    /// Directory for the file-backed store
    pub storage_dir: PathBuf,
    /// Dedup cache settings
    pub cache: CacheConfig,
    /// Guest cart policy
    pub guest_policy: GuestPolicy,
    /// Account to sign in at startup
    pub session: Option<SessionConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Dedup cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Freshness window of a cached read
    pub ttl: Duration,
    /// Maximum number of cached reads
    pub capacity: u64,
    /// Interval of the background sweep
    pub sweep_interval: Duration,
}

/// Account credentials supplied by the environment.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct SessionConfig {
    /// Account email
    pub email: Email,
    /// Backend session token
    pub token: SecretString,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SessionConfig {
    /// The identity these credentials sign in as.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.email.clone(), self.token.clone())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            capacity: DEFAULT_CACHE_CAPACITY,
            sweep_interval: Duration::from_millis(DEFAULT_CACHE_SWEEP_MS),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            cache: CacheConfig::default(),
            guest_policy: GuestPolicy::default(),
            session: None,
            sentry_dsn: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, or if only
    /// one half of the session pair is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`SyncConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("VITRINE_API_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("VITRINE_API_URL".to_string(), e.to_string())
                })
            })
            .transpose()?;

        let storage_dir = lookup("VITRINE_STORAGE_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);

        let cache = CacheConfig {
            ttl: Duration::from_millis(parse_or_default(
                &lookup,
                "VITRINE_CACHE_TTL_MS",
                DEFAULT_CACHE_TTL_MS,
            )?),
            capacity: parse_or_default(&lookup, "VITRINE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
            sweep_interval: Duration::from_millis(parse_or_default(
                &lookup,
                "VITRINE_CACHE_SWEEP_MS",
                DEFAULT_CACHE_SWEEP_MS,
            )?),
        };

        let guest_policy = if parse_or_default(&lookup, "VITRINE_GUEST_CART", false)? {
            GuestPolicy::Allow
        } else {
            GuestPolicy::RequireLogin
        };

        let session = match (
            lookup("VITRINE_SESSION_EMAIL"),
            lookup("VITRINE_SESSION_TOKEN"),
        ) {
            (Some(email), Some(token)) => Some(SessionConfig {
                email: Email::parse(&email).map_err(|e| {
                    ConfigError::InvalidEnvVar("VITRINE_SESSION_EMAIL".to_string(), e.to_string())
                })?,
                token: SecretString::from(token),
            }),
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar(
                    "VITRINE_SESSION_TOKEN".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar(
                    "VITRINE_SESSION_EMAIL".to_string(),
                ));
            }
            (None, None) => None,
        };

        Ok(Self {
            api_url,
            storage_dir,
            cache,
            guest_policy,
            session,
            sentry_dsn: lookup("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SyncConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.api_url.is_none());
        assert_eq!(config.storage_dir, PathBuf::from(".vitrine"));
        assert_eq!(config.cache.ttl, Duration::from_secs(30));
        assert_eq!(config.guest_policy, GuestPolicy::RequireLogin);
        assert!(config.session.is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("VITRINE_API_URL", "https://api.example.com/v1"),
            ("VITRINE_CACHE_TTL_MS", "500"),
            ("VITRINE_GUEST_CART", "true"),
            ("VITRINE_SESSION_EMAIL", "A@X.com"),
            ("VITRINE_SESSION_TOKEN", "tok"),
        ]))
        .unwrap();

        assert_eq!(config.api_url.unwrap().host_str(), Some("api.example.com"));
        assert_eq!(config.cache.ttl, Duration::from_millis(500));
        assert_eq!(config.guest_policy, GuestPolicy::Allow);
        assert_eq!(config.session.unwrap().email.canonical(), "a@x.com");
    }

    #[test]
    fn test_invalid_number() {
        let err = SyncConfig::from_lookup(lookup_from(&[("VITRINE_CACHE_TTL_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "VITRINE_CACHE_TTL_MS"));
    }

    #[test]
    fn test_session_pair_must_be_complete() {
        let err = SyncConfig::from_lookup(lookup_from(&[("VITRINE_SESSION_EMAIL", "a@x.com")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "VITRINE_SESSION_TOKEN"));
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = SessionConfig {
            email: Email::parse("a@x.com").unwrap(),
            token: SecretString::from("s3cret"),
        };
        assert!(!format!("{session:?}").contains("s3cret"));
    }
}
