//! Classboard Core Library
//!
//! Real-time synchronization of a shared classroom whiteboard: a local record
//! store, throttled delta extraction, the broadcast wire protocol and the
//! authority-controlled permission model.

pub mod cache;
pub mod config;
pub mod diff;
pub mod engine;
pub mod export;
pub mod notice;
pub mod permission;
pub mod protocol;
pub mod record;
pub mod store;
pub mod surface;
pub mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::Instant;

#[cfg(target_arch = "wasm32")]
pub use web_time::Instant;

pub use cache::{MemoryCache, SessionCache, SnapshotCache};
pub use config::SyncConfig;
pub use diff::DiffExtractor;
pub use engine::{SessionState, SyncEngine, SyncError, SyncStats};
pub use export::{ExportArtifact, ExportFormat, SurfaceRenderer};
pub use notice::Notice;
pub use permission::{PermissionController, PermissionError, PermissionMode, Role};
pub use protocol::{ProtocolError, WhiteboardMessage};
pub use record::{DocumentSnapshot, Record, RecordId};
pub use store::RecordStore;
pub use surface::{Batch, ChangeFilter, ChangeOrigin, ChangeSet, DrawingSurface};
pub use transport::{MemoryPeer, MemoryRoom, SendOptions, Transport, TransportError};
