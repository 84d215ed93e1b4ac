//! Cache Store Module
//!
//! In-process engine behind `MemoryCache`: a HashMap of TTL entries holding
//! either strings or sorted sets, with lazy expiry on access and an explicit
//! sweep for the background cleanup task.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::entry::{CacheEntry, CacheValue};
use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, CacheResult};

// == Cache Store ==
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `key`; an expired entry is removed and reads as absent.
    fn live_entry(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired()) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    // == Get ==
    pub fn get(&mut self, key: &str) -> CacheResult<Option<String>> {
        match self.live_entry(key).map(|e| &e.value) {
            Some(CacheValue::Text(value)) => Ok(Some(value.clone())),
            Some(CacheValue::Sorted(_)) => Err(CacheError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    // == Set ==
    /// Stores a string value, overwriting any previous value and TTL.
    pub fn set(&mut self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        let entry = CacheEntry::new(CacheValue::Text(value.to_string()), Some(ttl));
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    // == Delete ==
    /// Removes a key. Returns whether a live entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Sorted Add ==
    /// Adds or rescores members. A new key is created without expiry.
    pub fn zadd(&mut self, key: &str, members: &[(String, f64)]) -> CacheResult<()> {
        if self.live_entry(key).is_none() {
            self.entries.insert(
                key.to_string(),
                CacheEntry::new(CacheValue::Sorted(HashMap::new()), None),
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(CacheValue::Sorted(set)) => {
                for (member, score) in members {
                    set.insert(member.clone(), *score);
                }
                Ok(())
            }
            _ => Err(CacheError::WrongType(key.to_string())),
        }
    }

    // == Sorted Reverse Range ==
    /// Members ranked `start..=stop` by score descending, ties by member descending.
    pub fn zrevrange(&mut self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>> {
        let set = match self.live_entry(key).map(|e| &e.value) {
            Some(CacheValue::Sorted(set)) => set,
            Some(CacheValue::Text(_)) => return Err(CacheError::WrongType(key.to_string())),
            None => return Ok(Vec::new()),
        };
        if start > stop {
            return Ok(Vec::new());
        }
        let mut ranked: Vec<(&String, &f64)> = set.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| b.0.cmp(a.0)));
        Ok(ranked
            .into_iter()
            .skip(start)
            .take((stop - start).saturating_add(1))
            .map(|(member, _)| member.clone())
            .collect())
    }

    // == Expire ==
    /// Refreshes the TTL of a live key. Returns false if the key is absent.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        match self.live_entry(key) {
            Some(entry) => {
                entry.refresh(ttl);
                true
            }
            None => false,
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    // == Length ==
    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn members(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(m, s)| (m.to_string(), *s)).collect()
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = CacheStore::new();

        store.set("key1", "value1", TTL).unwrap();

        assert_eq!(store.get("key1").unwrap(), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = CacheStore::new();
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_store_delete() {
        let mut store = CacheStore::new();

        store.set("key1", "value1", TTL).unwrap();
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));

        assert!(store.is_empty());
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = CacheStore::new();

        store.set("key1", "value1", Duration::from_millis(50)).unwrap();
        assert!(store.get("key1").unwrap().is_some());

        sleep(Duration::from_millis(80));

        assert_eq!(store.get("key1").unwrap(), None);
        assert!(store.is_empty(), "expired entry is removed on access");
    }

    #[test]
    fn test_zrevrange_orders_by_score_descending() {
        let mut store = CacheStore::new();
        store
            .zadd("feed", &members(&[("1", 100.0), ("2", 300.0), ("3", 200.0)]))
            .unwrap();

        assert_eq!(store.zrevrange("feed", 0, 9).unwrap(), vec!["2", "3", "1"]);
        assert_eq!(store.zrevrange("feed", 1, 1).unwrap(), vec!["3"]);
        assert!(store.zrevrange("feed", 5, 9).unwrap().is_empty());
    }

    #[test]
    fn test_zadd_rescores_existing_member() {
        let mut store = CacheStore::new();
        store.zadd("feed", &members(&[("1", 1.0), ("2", 2.0)])).unwrap();
        store.zadd("feed", &members(&[("1", 3.0)])).unwrap();

        assert_eq!(store.zrevrange("feed", 0, 9).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let mut store = CacheStore::new();
        store.set("plain", "value", TTL).unwrap();

        assert!(matches!(
            store.zadd("plain", &members(&[("1", 1.0)])),
            Err(CacheError::WrongType(_))
        ));
        assert!(matches!(
            store.zrevrange("plain", 0, 1),
            Err(CacheError::WrongType(_))
        ));
    }

    #[test]
    fn test_expire_applies_to_sorted_sets() {
        let mut store = CacheStore::new();
        store.zadd("feed", &members(&[("1", 1.0)])).unwrap();

        assert!(store.expire("feed", Duration::from_millis(50)));
        assert!(!store.expire("missing", TTL));

        sleep(Duration::from_millis(80));
        assert!(store.zrevrange("feed", 0, 9).unwrap().is_empty());
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = CacheStore::new();

        store.set("key1", "value1", Duration::from_millis(50)).unwrap();
        store.set("key2", "value2", Duration::from_secs(10)).unwrap();

        sleep(Duration::from_millis(80));

        let removed = store.cleanup_expired();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").unwrap().is_some());
    }

    #[test]
    fn test_store_key_too_long() {
        let mut store = CacheStore::new();
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        assert!(matches!(
            store.set(&long_key, "value", TTL),
            Err(CacheError::InvalidKey(_))
        ));
    }
}
