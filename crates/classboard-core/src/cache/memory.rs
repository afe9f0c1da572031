//! In-memory snapshot cache.

use super::{SnapshotCache, StorageError, StorageResult};
use crate::record::DocumentSnapshot;
use std::cell::RefCell;
use std::collections::HashMap;

/// Stores snapshots as JSON strings, like a web session storage would.
#[derive(Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Store raw text under `key`, bypassing serialization.
    pub fn insert_raw(&self, key: &str, raw: &str) {
        self.entries.borrow_mut().insert(key.to_string(), raw.to_string());
    }
}

impl SnapshotCache for MemoryCache {
    fn save(&self, key: &str, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        let json = serde_json::to_string(snapshot).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.entries.borrow_mut().insert(key.to_string(), json);
        Ok(())
    }

    fn load(&self, key: &str) -> StorageResult<DocumentSnapshot> {
        let entries = self.entries.borrow();
        let json = entries.get(key).ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        DocumentSnapshot::from_json(json).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.borrow().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn test_save_and_load() {
        let cache = MemoryCache::new();
        let snapshot = DocumentSnapshot::from_records([Record::new("shape:1").with_field("x", 2)]);

        cache.save("room", &snapshot).unwrap();
        assert_eq!(cache.load("room").unwrap(), snapshot);
    }

    #[test]
    fn test_not_found() {
        let cache = MemoryCache::new();
        assert!(matches!(cache.load("nonexistent"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_entry() {
        let cache = MemoryCache::new();
        cache.insert_raw("room", "{not json");
        assert!(matches!(cache.load("room"), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_exists_and_delete() {
        let cache = MemoryCache::new();
        assert!(!cache.exists("room").unwrap());
        cache.save("room", &DocumentSnapshot::default()).unwrap();
        assert!(cache.exists("room").unwrap());
        cache.delete("room").unwrap();
        assert!(!cache.exists("room").unwrap());
        assert!(cache.is_empty());
    }
}
