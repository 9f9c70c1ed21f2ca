//! Refresh backends
//!
//! A refresh backend performs the actual cache update for one entry. The
//! scheduler hands it `(resource_id, source_location)` and gets back an
//! [`UpdateHandle`]; the backend then reports zero or more
//! [`RefreshState::Checking`] states followed by exactly one terminal state,
//! `Finished` or `Error`.
//!
//! ```text
//!  Reconciler ──schedule_update──▶ RefreshBackend
//!      ▲                                │
//!      │         UpdateHandle           │ UpdateReporter
//!      └──── checking* , finished ◀─────┘
//!                       | error
//! ```
//!
//! # Backends
//!
//! - [`HttpRefreshBackend`] fetches the source location over HTTP and stores
//!   the body in a cache directory.
//! - [`MockRefreshBackend`] replays scripted outcomes, for tests.

pub mod http;
pub mod mock;

use thiserror::Error;
use tokio::sync::mpsc;

pub use http::{HttpBackendConfig, HttpRefreshBackend};
pub use mock::{MockRefreshBackend, ScriptedRefresh};

// ============================================================================
// States
// ============================================================================

/// State reports emitted by a refresh in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    /// The backend is checking the source; not terminal
    Checking,

    /// The refresh completed at the given time (ms since epoch)
    Finished { completed_at: i64 },

    /// The refresh failed
    Error { reason: String },
}

impl RefreshState {
    /// Check if this state ends the refresh
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Checking)
    }
}

/// Terminal result of one refresh as seen by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Finished { completed_at: i64 },
    Failed { reason: String },
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while refreshing an entry
#[derive(Error, Debug)]
pub enum RefreshError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned status {0}")]
    Status(u16),

    /// Source location is not a fetchable URL
    #[error("Invalid source location: {0}")]
    InvalidUrl(String),

    /// Writing the cached content failed
    #[error("Cache write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Retryable failures persisted past the retry budget
    #[error("Giving up after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: u32, last: String },

    /// No terminal state arrived in time
    #[error("Refresh timed out after {0} ms")]
    Timeout(u64),

    /// The backend dropped the update handle without a terminal state
    #[error("Refresh backend went away before reporting a result")]
    BackendGone,

    /// Backend-specific failure
    #[error("{0}")]
    Backend(String),
}

impl RefreshError {
    /// Check if a retry could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

// ============================================================================
// Handle and Reporter
// ============================================================================

/// Receiving side of a scheduled refresh
#[derive(Debug)]
pub struct UpdateHandle {
    resource_id: String,
    rx: mpsc::UnboundedReceiver<RefreshState>,
}

/// Sending side of a scheduled refresh, owned by the backend
#[derive(Debug, Clone)]
pub struct UpdateReporter {
    tx: mpsc::UnboundedSender<RefreshState>,
}

impl UpdateHandle {
    /// Create a connected reporter/handle pair
    pub fn channel(resource_id: impl Into<String>) -> (UpdateReporter, UpdateHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            UpdateReporter { tx },
            UpdateHandle {
                resource_id: resource_id.into(),
                rx,
            },
        )
    }

    /// Identifier of the entry being refreshed
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Next state report, `None` once the backend has dropped its reporter
    pub async fn next_state(&mut self) -> Option<RefreshState> {
        self.rx.recv().await
    }

    /// Wait for the terminal state, observing intermediate reports
    pub async fn wait(mut self) -> RefreshOutcome {
        while let Some(state) = self.next_state().await {
            match state {
                RefreshState::Checking => {
                    tracing::debug!(resource_id = %self.resource_id, "Refresh checking");
                }
                RefreshState::Finished { completed_at } => {
                    return RefreshOutcome::Finished { completed_at };
                }
                RefreshState::Error { reason } => {
                    return RefreshOutcome::Failed { reason };
                }
            }
        }

        RefreshOutcome::Failed {
            reason: RefreshError::BackendGone.to_string(),
        }
    }
}

impl UpdateReporter {
    /// Report an intermediate checking state
    pub fn checking(&self) {
        self.report(RefreshState::Checking);
    }

    /// Report successful completion
    pub fn finished(&self, completed_at: i64) {
        self.report(RefreshState::Finished { completed_at });
    }

    /// Report failure
    pub fn error(&self, reason: impl Into<String>) {
        self.report(RefreshState::Error {
            reason: reason.into(),
        });
    }

    /// Resolves once the scheduler has stopped listening
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn report(&self, state: RefreshState) {
        // The scheduler may have given up waiting (timeout); nothing to do then
        let _ = self.tx.send(state);
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// External mechanism that refreshes one cached resource
pub trait RefreshBackend: Send + Sync {
    /// Start refreshing `resource_id` from `source_location`
    fn schedule_update(&self, resource_id: &str, source_location: &str) -> UpdateHandle;
}
