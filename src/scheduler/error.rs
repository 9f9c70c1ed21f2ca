//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Staleness frequency must be positive
    InvalidFrequency {
        millis: u128,
    },

    /// Timer period must be positive
    InvalidInterval {
        secs: u64,
    },

    /// A cycle was requested while another one is running
    CycleInProgress,

    /// Loading the snapshot from the entry store failed
    ScanFailed {
        reason: String,
    },

    /// Writing back a refreshed timestamp failed
    PersistFailed {
        resource_id: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFrequency { millis } => {
                write!(
                    f,
                    "Invalid staleness frequency '{}ms'. Must be greater than zero",
                    millis
                )
            }
            Self::InvalidInterval { secs } => {
                write!(
                    f,
                    "Invalid scan interval '{}s'. Must be greater than zero",
                    secs
                )
            }
            Self::CycleInProgress => {
                write!(f, "A reconciliation cycle is already running")
            }
            Self::ScanFailed { reason } => {
                write!(f, "Failed to load entries for reconciliation: {}", reason)
            }
            Self::PersistFailed {
                resource_id,
                reason,
            } => {
                write!(
                    f,
                    "Failed to persist refresh of '{}': {}",
                    resource_id, reason
                )
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid frequency error
    pub fn invalid_frequency(millis: u128) -> Self {
        Self::InvalidFrequency { millis }
    }

    /// Create an invalid interval error
    pub fn invalid_interval(secs: u64) -> Self {
        Self::InvalidInterval { secs }
    }

    /// Create a scan failure
    pub fn scan_failed(reason: impl fmt::Display) -> Self {
        Self::ScanFailed {
            reason: reason.to_string(),
        }
    }

    /// Create a persist failure
    pub fn persist_failed(resource_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::PersistFailed {
            resource_id: resource_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the next timer fire may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CycleInProgress | Self::ScanFailed { .. } | Self::PersistFailed { .. }
        )
    }
}
