//! Command implementations.
//!
//! Every command runs against a [`Session`]: the engine over a file-backed
//! store, initialized and (when configured) signed in.

pub mod cart;
pub mod migrate;
pub mod size_standard;
pub mod snapshot;
pub mod wishlist;

use std::sync::Arc;

use thiserror::Error;
use vitrine_sync::backend::{BackendError, HttpBackend};
use vitrine_sync::config::ConfigError;
use vitrine_sync::reconcile::Reconciliation;
use vitrine_sync::storage::{FileStore, StorageError};
use vitrine_sync::{SyncConfig, SyncEngine, SyncError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend client error: {0}")]
    Backend(#[from] BackendError),

    #[error("{}", .0.user_message())]
    Sync(#[from] SyncError),
}

/// An initialized engine for one command.
pub struct Session {
    pub engine: SyncEngine<HttpBackend>,
    pub legacy_entries: usize,
    legacy_push: Reconciliation,
}

impl Session {
    /// Open the store, sign in if configured, and initialize the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory or the backend client
    /// cannot be set up, or the configured session cannot be activated.
    pub fn open(config: &SyncConfig) -> Result<Self, CliError> {
        let store = Arc::new(FileStore::open(config.storage_dir.clone())?);
        let backend = config.api_url.as_ref().map(HttpBackend::new).transpose()?;
        if backend.is_none() {
            tracing::debug!("VITRINE_API_URL not set, running local-only");
        }

        let engine = SyncEngine::new(config, store, backend);

        // Sign in first so restored state and the legacy import land in the account
        if let Some(session) = &config.session {
            engine.login(session.identity())?;
        }
        let migration = engine.init();

        Ok(Self {
            engine,
            legacy_entries: migration.entries,
            legacy_push: migration.reconciliation,
        })
    }

    /// Wait for startup reconciliation and stop background work.
    pub async fn finish(self) {
        if let Err(e) = self.legacy_push.await {
            tracing::warn!("Legacy cart not synced: {e}");
        }
        self.engine.teardown().await;
    }
}

/// Await the backend half of an intent and report how it went.
///
/// The local change is already saved either way.
pub async fn settle(reconciliation: Reconciliation) {
    if let Err(e) = reconciliation.await {
        tracing::warn!(error = %e, "Saved locally, sync failed: {}", e.user_message());
    }
}
