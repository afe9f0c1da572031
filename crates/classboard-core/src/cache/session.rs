//! Debounced persistence of the open whiteboard.

use super::{SnapshotCache, StorageError, StorageResult, cache_key};
use crate::Instant;
use crate::record::DocumentSnapshot;
use std::rc::Rc;
use std::time::Duration;

/// Writes the room's snapshot to a [`SnapshotCache`] once edits settle.
pub struct SessionCache {
    /// Storage backend.
    backend: Rc<dyn SnapshotCache>,
    /// Storage key for this room.
    key: String,
    /// Quiet period after the last change.
    debounce: Duration,
    /// Time of the last change.
    last_change: Option<Instant>,
    /// Whether the document changed since the last write.
    dirty: bool,
}

impl SessionCache {
    pub fn new(backend: Rc<dyn SnapshotCache>, room_id: &str, debounce: Duration) -> Self {
        Self {
            backend,
            key: cache_key(room_id),
            debounce,
            last_change: None,
            dirty: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record a change; restarts the debounce window.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty = true;
        self.last_change = Some(now);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the document is dirty and the debounce window elapsed.
    pub fn should_save(&self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        match self.last_change {
            Some(last) => now.saturating_duration_since(last) >= self.debounce,
            None => true,
        }
    }

    /// When the pending write is due, if any.
    pub fn next_save_at(&self) -> Option<Instant> {
        if !self.dirty {
            return None;
        }
        self.last_change.map(|last| last + self.debounce)
    }

    /// Write the snapshot if needed. Returns true if a write happened.
    pub fn maybe_save(&mut self, now: Instant, snapshot: impl FnOnce() -> DocumentSnapshot) -> StorageResult<bool> {
        if !self.should_save(now) {
            return Ok(false);
        }
        self.save(&snapshot())?;
        Ok(true)
    }

    /// Write immediately.
    pub fn save(&mut self, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        self.backend.save(&self.key, snapshot)?;
        self.dirty = false;
        Ok(())
    }

    /// Load the cached snapshot. Missing or unreadable entries yield `None`.
    pub fn load(&self) -> Option<DocumentSnapshot> {
        match self.backend.load(&self.key) {
            Ok(snapshot) => match snapshot.mismatched_key() {
                Some(key) => {
                    log::warn!("Ignoring cached whiteboard {}: key {} does not match its record", self.key, key);
                    None
                }
                None => Some(snapshot),
            },
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                log::warn!("Ignoring cached whiteboard {}: {}", self.key, e);
                None
            }
        }
    }

    /// Forget the cached snapshot.
    pub fn clear(&mut self) -> StorageResult<()> {
        self.dirty = false;
        self.backend.delete(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::record::Record;

    fn cache(debounce_ms: u64) -> (Rc<MemoryCache>, SessionCache) {
        let backend = Rc::new(MemoryCache::new());
        let session = SessionCache::new(backend.clone(), "room-1", Duration::from_millis(debounce_ms));
        (backend, session)
    }

    #[test]
    fn test_key_is_per_room() {
        let (_, session) = cache(700);
        assert_eq!(session.key(), "whiteboard-snapshot:room-1");
    }

    #[test]
    fn test_clean_cache_does_not_save() {
        let (_, session) = cache(700);
        assert!(!session.should_save(Instant::now()));
        assert!(session.next_save_at().is_none());
    }

    #[test]
    fn test_debounce_restarts_on_each_change() {
        let (backend, mut session) = cache(700);
        let t0 = Instant::now();

        session.mark_dirty(t0);
        session.mark_dirty(t0 + Duration::from_millis(500));
        assert!(!session.should_save(t0 + Duration::from_millis(900)));
        assert_eq!(session.next_save_at(), Some(t0 + Duration::from_millis(1200)));

        let saved = session
            .maybe_save(t0 + Duration::from_millis(1200), DocumentSnapshot::default)
            .unwrap();
        assert!(saved);
        assert!(!session.is_dirty());
        assert!(backend.exists("whiteboard-snapshot:room-1").unwrap());
    }

    #[test]
    fn test_load_roundtrip_and_clear() {
        let (_, mut session) = cache(0);
        let snapshot = DocumentSnapshot::from_records([Record::new("shape:1")]);

        assert!(session.load().is_none());
        session.save(&snapshot).unwrap();
        assert_eq!(session.load(), Some(snapshot));

        session.clear().unwrap();
        assert!(session.load().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_ignored() {
        let (backend, session) = cache(0);
        backend.insert_raw(session.key(), "garbage");
        assert!(session.load().is_none());
    }

    #[test]
    fn test_inconsistent_entry_is_ignored() {
        let (backend, session) = cache(0);
        backend.insert_raw(
            session.key(),
            r#"{"schema":1,"store":{"shape:a":{"id":"shape:b"}}}"#,
        );
        assert!(session.load().is_none());
    }
}
