//! Staleness policy
//!
//! An entry is stale once strictly more than `frequency` has elapsed since
//! its last successful refresh.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{SchedulerError, SchedulerResult};
use crate::storage::TrackedEntry;

/// Default staleness frequency: five minutes
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(300);

/// Result of evaluating one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh { elapsed_ms: i64 },
    Stale { elapsed_ms: i64 },
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    pub fn elapsed_ms(&self) -> i64 {
        match self {
            Self::Fresh { elapsed_ms } | Self::Stale { elapsed_ms } => *elapsed_ms,
        }
    }
}

/// Minimum interval between refreshes of the same entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    frequency_ms: u64,
}

impl StalenessPolicy {
    /// Create a policy, rejecting a zero frequency
    pub fn new(frequency: Duration) -> SchedulerResult<Self> {
        let millis = frequency.as_millis();
        if millis == 0 {
            return Err(SchedulerError::invalid_frequency(millis));
        }
        Ok(Self {
            frequency_ms: u64::try_from(millis).unwrap_or(u64::MAX),
        })
    }

    /// Create a policy from whole seconds
    pub fn from_secs(secs: u64) -> SchedulerResult<Self> {
        Self::new(Duration::from_secs(secs))
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }

    pub fn frequency_ms(&self) -> u64 {
        self.frequency_ms
    }

    /// Evaluate an entry against `now` (ms since epoch)
    pub fn evaluate(&self, entry: &TrackedEntry, now: i64) -> Staleness {
        let elapsed_ms = now.saturating_sub(entry.last_update);
        let threshold = i64::try_from(self.frequency_ms).unwrap_or(i64::MAX);

        if elapsed_ms > threshold {
            Staleness::Stale { elapsed_ms }
        } else {
            Staleness::Fresh { elapsed_ms }
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            frequency_ms: DEFAULT_FREQUENCY.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn entry(last_update: i64) -> TrackedEntry {
        TrackedEntry::new("r1", "s1", last_update)
    }

    #[test]
    fn test_default_is_explicit() {
        let policy = StalenessPolicy::default();
        assert_eq!(policy.frequency(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        assert!(StalenessPolicy::new(Duration::ZERO).is_err());
        assert!(StalenessPolicy::new(Duration::from_micros(10)).is_err());
    }

    #[test]
    fn test_fresh_within_frequency() {
        let policy = StalenessPolicy::new(Duration::from_millis(3_600_000)).unwrap();
        let result = policy.evaluate(&entry(T0), T0 + 1_000);
        assert_eq!(result, Staleness::Fresh { elapsed_ms: 1_000 });
    }

    #[test]
    fn test_boundary_is_fresh() {
        let policy = StalenessPolicy::new(Duration::from_millis(1_000)).unwrap();
        assert!(!policy.evaluate(&entry(T0), T0 + 1_000).is_stale());
        assert!(policy.evaluate(&entry(T0), T0 + 1_001).is_stale());
    }

    #[test]
    fn test_stale_after_frequency() {
        let policy = StalenessPolicy::new(Duration::from_millis(3_600_000)).unwrap();
        let result = policy.evaluate(&entry(T0), T0 + 4_000_000);
        assert!(result.is_stale());
        assert_eq!(result.elapsed_ms(), 4_000_000);
    }

    #[test]
    fn test_never_refreshed_is_stale() {
        let policy = StalenessPolicy::default();
        assert!(policy.evaluate(&entry(0), T0).is_stale());
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let policy = StalenessPolicy::default();
        assert!(!policy.evaluate(&entry(T0 + 10_000), T0).is_stale());
    }
}
