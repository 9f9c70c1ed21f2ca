//! Unified error handling for the appcache-updater crate
//!
//! Module errors ([`StoreError`], [`SchedulerError`], [`RefreshError`]) stay
//! usable on their own; [`Error`] wraps them at the registry and CLI
//! boundary.
//!
//! # Usage
//!
//! ```rust,ignore
//! use appcache_updater::error::{AppcacheErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Will retry on next cycle: {err}");
//!     } else {
//!         eprintln!("Fatal error ({:?}): {err}", err.category());
//!     }
//! }
//! ```

use thiserror::Error;

pub use crate::refresh::RefreshError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::storage::StoreError;

/// Common interface for the crate's error types
pub trait AppcacheErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Entry store errors
    Storage,
    /// Scheduling and cycle errors
    Scheduler,
    /// Fetching a source location
    Network,
    /// Rejected caller input
    Input,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Scheduler => "scheduler",
            Self::Network => "network",
            Self::Input => "input",
            Self::Config => "config",
        }
    }
}

/// Unified error type for the appcache-updater crate
#[derive(Error, Debug)]
pub enum Error {
    /// Entry store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Refresh backend errors
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Invalid registry input
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

impl AppcacheErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Refresh(e) => e.is_retryable(),
            Self::InvalidEntry(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(_) => ErrorCategory::Storage,
            Self::Scheduler(SchedulerError::InvalidFrequency { .. }) => ErrorCategory::Input,
            Self::Scheduler(SchedulerError::InvalidInterval { .. }) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Refresh(_) => ErrorCategory::Network,
            Self::InvalidEntry(_) => ErrorCategory::Input,
        }
    }
}

impl Error {
    /// Create an invalid entry error
    pub fn invalid_entry(msg: impl Into<String>) -> Self {
        Self::InvalidEntry(msg.into())
    }

    /// Check if the error is a duplicate-identifier rejection
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Store(StoreError::Duplicate(_)))
    }

    /// Check if the error is an unknown-identifier rejection
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let store_err = Error::Store(StoreError::Read("locked".into()));
        assert_eq!(store_err.category(), ErrorCategory::Storage);

        let freq_err = Error::Scheduler(SchedulerError::invalid_frequency(0));
        assert_eq!(freq_err.category(), ErrorCategory::Input);

        let refresh_err = Error::Refresh(RefreshError::Status(503));
        assert_eq!(refresh_err.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Refresh(RefreshError::Status(503)).is_recoverable());
        assert!(!Error::invalid_entry("empty identifier").is_recoverable());
        assert!(!Error::Scheduler(SchedulerError::invalid_interval(0)).is_recoverable());
    }

    #[test]
    fn test_duplicate_and_not_found() {
        let dup: Error = StoreError::Duplicate("r1".into()).into();
        assert!(dup.is_duplicate());
        assert!(!dup.is_not_found());

        let missing: Error = StoreError::NotFound("r1".into()).into();
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_interval_error_is_config() {
        let err = Error::Scheduler(SchedulerError::invalid_interval(0));
        assert_eq!(err.category(), ErrorCategory::Config);
        assert_eq!(err.category().as_str(), "config");
    }
}
