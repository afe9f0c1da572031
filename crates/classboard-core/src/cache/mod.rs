//! Session snapshot cache.
//!
//! Keeps the last known whiteboard document per room for the lifetime of the
//! browser/app session, so reopening the whiteboard shows the previous drawing
//! before the authority's snapshot arrives.

mod memory;
mod session;

pub use memory::MemoryCache;
pub use session::SessionCache;

use crate::record::DocumentSnapshot;
use thiserror::Error;

/// Cache errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for cache operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Key under which a room's snapshot is stored.
pub fn cache_key(room_id: &str) -> String {
    format!("whiteboard-snapshot:{}", room_id)
}

/// Storage backend for whiteboard snapshots.
///
/// Calls are synchronous: the engine runs to completion on a single event
/// loop turn and backends are expected to be session-local (memory, web
/// session storage).
pub trait SnapshotCache {
    /// Store a snapshot under `key`.
    fn save(&self, key: &str, snapshot: &DocumentSnapshot) -> StorageResult<()>;

    /// Load the snapshot stored under `key`.
    fn load(&self, key: &str) -> StorageResult<DocumentSnapshot>;

    /// Forget `key`.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if `key` exists.
    fn exists(&self, key: &str) -> StorageResult<bool>;
}
