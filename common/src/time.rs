//! Time utilities for hashbreak
//!
//! This module provides common time-related utility functions
//! used across different hashbreak modules.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since UNIX_EPOCH
///
/// This function provides a consistent way to get timestamps
/// across the cluster for logging and membership bookkeeping.
pub fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Get current timestamp in milliseconds since UNIX_EPOCH
///
/// Higher precision variant used for elapsed-time reporting.
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_current_timestamp_secs() {
        let timestamp1 = current_timestamp_secs();
        thread::sleep(Duration::from_millis(10));
        let timestamp2 = current_timestamp_secs();

        // Should be at least the same, possibly different by 1 second
        assert!(timestamp2 >= timestamp1);
        assert!(timestamp2 - timestamp1 <= 1);
    }

    #[test]
    fn test_current_timestamp_millis() {
        let timestamp1 = current_timestamp_millis();
        thread::sleep(Duration::from_millis(10));
        let timestamp2 = current_timestamp_millis();

        assert!(timestamp2 > timestamp1);
        assert!(timestamp2 - timestamp1 >= 10);
    }
}
