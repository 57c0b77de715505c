//! Second phase of a cart or wishlist intent.
//!
//! Every intent first mutates the local collection synchronously and then
//! hands back a [`Reconciliation`]: either already settled (nothing to tell
//! the backend) or a spawned task converging the backend with the local
//! change. Awaiting it reports the outcome; dropping it lets the task run
//! detached. A failed reconciliation never touches the local collection
//! again.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Outcome of the backend half of an intent.
#[must_use = "a reconciliation reports backend failures only when awaited"]
#[derive(Debug)]
pub struct Reconciliation {
    state: State,
}

#[derive(Debug)]
enum State {
    Settled(Result<()>),
    Spawned(JoinHandle<Result<()>>),
}

impl Reconciliation {
    /// A reconciliation with nothing left to do.
    pub const fn settled() -> Self {
        Self {
            state: State::Settled(Ok(())),
        }
    }

    const fn failed(err: SyncError) -> Self {
        Self {
            state: State::Settled(Err(err)),
        }
    }

    /// Whether the outcome is already known.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        match &self.state {
            State::Settled(_) => true,
            State::Spawned(handle) => handle.is_finished(),
        }
    }
}

impl IntoFuture for Reconciliation {
    type Output = Result<()>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            match self.state {
                State::Settled(result) => result,
                State::Spawned(handle) => handle
                    .await
                    .map_err(|e| SyncError::Internal(format!("reconciliation task failed: {e}")))?,
            }
        })
    }
}

/// Pending work and last failure of one collection.
#[derive(Debug, Default)]
struct Status {
    pending: usize,
    error: Option<String>,
}

/// Drives the `loading` and `error` fields of a collection.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    status: Arc<Mutex<Status>>,
}

impl Tracker {
    /// Whether any backend work is outstanding.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.with_status(|status| status.pending > 0)
    }

    /// Message of the last failure, until the next success.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.with_status(|status| status.error.clone())
    }

    /// Record an intent that needed no backend work.
    pub fn settled(&self) -> Reconciliation {
        self.record(None);
        Reconciliation::settled()
    }

    /// Run `task` on the current tokio runtime, counting it as pending until
    /// it finishes and recording its outcome.
    pub fn spawn<F>(&self, task: F) -> Reconciliation
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let err = SyncError::Internal("no async runtime to reconcile on".to_string());
            self.record(Some(&err));
            return Reconciliation::failed(err);
        };

        let guard = self.begin();
        let tracker = self.clone();
        let handle = runtime.spawn(async move {
            let _guard = guard;
            let result = task.await;
            tracker.record(result.as_ref().err());
            result
        });

        Reconciliation {
            state: State::Spawned(handle),
        }
    }

    /// Run `task` inline, counting it as pending while it runs.
    ///
    /// # Errors
    ///
    /// Returns the task's error after recording it.
    pub async fn track<T>(&self, task: impl Future<Output = Result<T>>) -> Result<T> {
        let _guard = self.begin();
        let result = task.await;
        self.record(result.as_ref().err());
        result
    }

    fn begin(&self) -> PendingGuard {
        self.with_status(|status| status.pending += 1);
        PendingGuard {
            tracker: self.clone(),
        }
    }

    fn record(&self, failure: Option<&SyncError>) {
        if let Some(err) = failure {
            warn!(error = %err, "Reconciliation failed");
        }
        self.with_status(|status| status.error = failure.map(ToString::to_string));
    }

    fn with_status<T>(&self, f: impl FnOnce(&mut Status) -> T) -> T {
        // Counters and a message; nothing a panicking holder could leave half-written.
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status)
    }
}

/// Decrements the pending count when a tracked task ends, panics included.
struct PendingGuard {
    tracker: Tracker,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.tracker
            .with_status(|status| status.pending = status.pending.saturating_sub(1));
    }
}
