//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Value ==
/// Value held under a key: a plain string or a scored member set.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Text(String),
    Sorted(HashMap<String, f64>),
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: CacheValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    pub fn new(value: CacheValue, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl.as_millis() as u64),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches the expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    // == Refresh ==
    /// Resets the expiration to `ttl` from now, keeping the value.
    pub fn refresh(&mut self, ttl: Duration) {
        self.expires_at = Some(current_timestamp_ms() + ttl.as_millis() as u64);
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn text(value: &str) -> CacheValue {
        CacheValue::Text(value.to_string())
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(text("test_value"), None);

        assert_eq!(entry.value, text("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining_ms().is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(text("test_value"), Some(Duration::from_millis(50)));

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(80));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), Some(0));
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let mut entry = CacheEntry::new(text("v"), Some(Duration::from_millis(50)));
        sleep(Duration::from_millis(30));

        entry.refresh(Duration::from_secs(10));

        let remaining = entry.ttl_remaining_ms().unwrap();
        assert!(remaining > 9_000);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            value: text("test"),
            created_at: now,
            expires_at: Some(now), // Expires exactly at creation time
        };

        assert!(entry.is_expired(), "Entry should be expired at boundary");
    }
}
