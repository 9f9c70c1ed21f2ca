//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod clock;
pub mod retry;

use sha2::{Digest, Sha256};

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{with_retry_if, RetryConfig};

/// Hex-encoded SHA-256 of a string
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Format a millisecond timestamp for display, "never" for 0
pub fn format_millis(millis: i64) -> String {
    use chrono::{TimeZone, Utc};

    if millis <= 0 {
        return "never".to_string();
    }

    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{millis}ms"),
    }
}
