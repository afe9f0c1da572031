//! Whiteboard session synchronization.
//!
//! One [`SyncEngine`] exists per open whiteboard. It bridges the local drawing
//! surface and the room transport: local edits leave as throttled deltas,
//! inbound deltas and snapshots are replayed without being echoed back, and
//! the permission mode follows the session authority.

use crate::cache::{SessionCache, SnapshotCache};
use crate::config::SyncConfig;
use crate::diff::{DiffExtractor, RemoteApply, SharedExtractor};
use crate::export::{self, ExportArtifact, ExportError, SurfaceRenderer};
use crate::notice::Notice;
use crate::permission::{PermissionController, PermissionError, PermissionMode, Role};
use crate::protocol::{self, ProtocolError, WhiteboardMessage};
use crate::record::{DocumentSnapshot, Record, RecordId};
use crate::surface::{Batch, ChangeFilter, ChangeOrigin, ChangeSet, DrawingSurface, SubscriptionId};
use crate::transport::{SendOptions, Transport};
use crate::Instant;
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

/// Errors returned to callers misusing the engine.
///
/// Network and payload failures never surface here; they are logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Local peer does not have write access")]
    ReadOnly,
    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),
    #[error(transparent)]
    Permission(#[from] PermissionError),
}

/// Lifecycle of the whiteboard on this peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active(PermissionMode),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Inactive,
    Active,
    Closed,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub deltas_sent: u64,
    pub deltas_applied: u64,
    pub snapshots_sent: u64,
    pub snapshots_applied: u64,
    pub permissions_applied: u64,
    pub payloads_dropped: u64,
    pub send_failures: u64,
}

/// Synchronizes one peer's whiteboard with the rest of the room.
pub struct SyncEngine<S: DrawingSurface, T: Transport> {
    config: SyncConfig,
    room_id: String,
    surface: S,
    transport: T,
    permission: PermissionController,
    extractor: SharedExtractor,
    /// Change feed subscriptions held while active.
    subscriptions: Vec<SubscriptionId>,
    /// Set by the change feed on any document change.
    document_changed: Rc<Cell<bool>>,
    lifecycle: Lifecycle,
    /// Settle timer for the authority's opening snapshot.
    snapshot_due: Option<Instant>,
    next_resnapshot: Option<Instant>,
    cache: Option<SessionCache>,
    notices: Vec<Notice>,
    stats: SyncStats,
}

impl<S: DrawingSurface, T: Transport> SyncEngine<S, T> {
    /// Create an engine for `room_id`. The whiteboard starts inactive.
    pub fn new(config: SyncConfig, role: Role, room_id: &str, surface: S, transport: T) -> Self {
        let permission = PermissionController::new(role);
        let extractor = DiffExtractor::new(config.throttle_interval(), permission.can_local_write()).shared();
        Self {
            config,
            room_id: room_id.to_string(),
            surface,
            transport,
            permission,
            extractor,
            subscriptions: Vec::new(),
            document_changed: Rc::new(Cell::new(false)),
            lifecycle: Lifecycle::Inactive,
            snapshot_due: None,
            next_resnapshot: None,
            cache: None,
            notices: Vec::new(),
            stats: SyncStats::default(),
        }
    }

    /// Persist the document to `backend` for the duration of the session.
    pub fn with_cache(mut self, backend: Rc<dyn SnapshotCache>) -> Self {
        self.cache = Some(SessionCache::new(backend, &self.room_id, self.config.cache_debounce()));
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Inactive => SessionState::Inactive,
            Lifecycle::Active => SessionState::Active(self.permission.current()),
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn role(&self) -> Role {
        self.permission.role()
    }

    pub fn is_authority(&self) -> bool {
        self.permission.is_authority()
    }

    pub fn permission(&self) -> PermissionMode {
        self.permission.current()
    }

    pub fn can_local_write(&self) -> bool {
        self.permission.can_local_write()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct access to the surface.
    ///
    /// Edits made here still go through the change feed and are only
    /// broadcast if the local peer may write.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Take pending user notices (drains the queue).
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // --- Lifecycle ---

    /// Open the whiteboard.
    ///
    /// Restores the cached document, subscribes to local changes and, on the
    /// authority, arms the opening snapshot.
    pub fn open(&mut self, now: Instant) -> Result<(), SyncError> {
        if self.lifecycle != Lifecycle::Inactive {
            return Err(SyncError::InvalidState("whiteboard was already opened"));
        }

        self.permission.reset();

        let extractor = self.extractor.clone();
        let feed = self.surface.subscribe(
            ChangeFilter::local(),
            Box::new(move |changes: &ChangeSet| match extractor.try_borrow_mut() {
                Ok(mut extractor) => extractor.record(changes),
                Err(_) => log::debug!("Change feed fired while the extractor was busy"),
            }),
        );
        let changed = self.document_changed.clone();
        let dirty = self
            .surface
            .subscribe(ChangeFilter::any(), Box::new(move |_: &ChangeSet| changed.set(true)));
        self.subscriptions = vec![feed, dirty];

        if let Some(snapshot) = self.cache.as_ref().and_then(SessionCache::load) {
            log::info!("Restoring {} cached records for room {}", snapshot.len(), self.room_id);
            let _guard = RemoteApply::begin(&self.extractor);
            self.surface.restore(snapshot, ChangeOrigin::Remote);
        }
        self.document_changed.set(false);

        self.update_write_gate();
        if self.is_authority() {
            self.snapshot_due = Some(now + self.config.settle_delay());
        }
        self.lifecycle = Lifecycle::Active;
        log::info!(
            "Whiteboard opened in room {} as {:?} ({})",
            self.room_id,
            self.role(),
            self.transport.local_identity()
        );
        Ok(())
    }

    /// Close the whiteboard locally. Nothing is broadcast.
    pub fn close(&mut self) {
        if self.lifecycle == Lifecycle::Active {
            self.snapshot_due = None;
            self.next_resnapshot = None;
            for id in self.subscriptions.drain(..) {
                self.surface.unsubscribe(id);
            }
            self.extractor.borrow_mut().discard();

            if let Some(cache) = self.cache.as_mut() {
                if cache.is_dirty() {
                    if let Err(e) = cache.save(&self.surface.full_state()) {
                        log::warn!("Failed to cache whiteboard on close: {}", e);
                    }
                }
            }
            log::info!("Whiteboard closed in room {}", self.room_id);
        }
        self.permission.reset();
        self.lifecycle = Lifecycle::Closed;
    }

    // --- Local edits ---

    /// Apply a locally authored batch and broadcast it as soon as the
    /// throttle allows.
    pub fn apply_local(&mut self, batch: &Batch, now: Instant) -> Result<(), SyncError> {
        if !self.is_active() {
            return Err(SyncError::InvalidState("whiteboard is not open"));
        }
        if !self.can_local_write() {
            return Err(SyncError::ReadOnly);
        }

        self.surface.apply_batch(batch, ChangeOrigin::Local);
        self.observe_document_change(now);
        self.flush_deltas(now);
        Ok(())
    }

    /// Convenience for drawing a single record.
    pub fn put_local(&mut self, record: Record, now: Instant) -> Result<(), SyncError> {
        self.apply_local(&Batch::new().update(record), now)
    }

    /// Convenience for erasing records.
    pub fn remove_local(&mut self, ids: impl IntoIterator<Item = RecordId>, now: Instant) -> Result<(), SyncError> {
        let batch = Batch {
            removed: ids.into_iter().collect(),
            ..Batch::default()
        };
        self.apply_local(&batch, now)
    }

    /// Flip the write-access mode. Authority only.
    pub fn toggle_permission(&mut self) -> Result<PermissionMode, SyncError> {
        if !self.is_active() {
            return Err(SyncError::InvalidState("whiteboard is not open"));
        }
        let notice = self.permission.toggle(&self.transport)?;
        self.notices.push(notice);
        self.update_write_gate();
        Ok(self.permission.current())
    }

    /// Export the current document.
    pub fn export(&mut self, renderer: Option<&dyn SurfaceRenderer>) -> Result<ExportArtifact, ExportError> {
        export::export_document(&self.surface, renderer, &mut self.notices)
    }

    // --- Timers ---

    /// Drive timers: opening snapshot, periodic snapshot, throttled deltas,
    /// cache writes.
    pub fn tick(&mut self, now: Instant) {
        if !self.is_active() {
            return;
        }

        if self.snapshot_due.is_some_and(|due| now >= due) {
            self.snapshot_due = None;
            self.send_snapshot();
            self.next_resnapshot = self.config.resnapshot_interval().map(|interval| now + interval);
        }
        if self.next_resnapshot.is_some_and(|due| now >= due) {
            self.send_snapshot();
            self.next_resnapshot = self.config.resnapshot_interval().map(|interval| now + interval);
        }

        self.observe_document_change(now);
        self.flush_deltas(now);
        self.persist(now);
    }

    /// Earliest instant, as seen from `now`, at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        [
            self.snapshot_due,
            self.next_resnapshot,
            self.extractor.borrow().next_flush_at(now),
            self.cache.as_ref().and_then(SessionCache::next_save_at),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // --- Inbound ---

    /// Handle a payload received from `sender`.
    ///
    /// Undecodable payloads are dropped; processing of later payloads is not
    /// affected.
    pub fn handle_payload(&mut self, payload: &[u8], sender: &str, now: Instant) {
        if !self.is_active() {
            log::debug!("Whiteboard not open, ignoring payload from {}", sender);
            return;
        }

        let msg = match protocol::decode(payload) {
            Ok(msg) => msg,
            Err(ProtocolError::ForeignKind(kind)) => {
                log::debug!("Ignoring non-whiteboard message `{}` from {}", kind, sender);
                return;
            }
            Err(e) => {
                log::warn!("Dropping payload from {}: {}", sender, e);
                self.stats.payloads_dropped += 1;
                return;
            }
        };

        log::debug!("Received {} from {}", msg.kind(), sender);
        match msg {
            WhiteboardMessage::Delta {
                added,
                updated,
                removed_ids,
                permission,
            } => self.apply_delta(added, updated, removed_ids, permission),
            WhiteboardMessage::Snapshot { document, permission } => self.apply_snapshot(document, permission),
            WhiteboardMessage::Permission { permission } => self.apply_permission(permission),
        }
        self.observe_document_change(now);
    }

    fn apply_delta(
        &mut self,
        added: Vec<Record>,
        updated: Vec<Record>,
        removed: Vec<RecordId>,
        permission: PermissionMode,
    ) {
        if self.extractor.borrow().is_applying_remote() {
            log::debug!("Delta arrived mid-application, skipping");
            return;
        }

        let batch = Batch { added, updated, removed };
        {
            let _guard = RemoteApply::begin(&self.extractor);
            self.surface.apply_batch(&batch, ChangeOrigin::Remote);
        }
        self.stats.deltas_applied += 1;

        if self.permission.observe_belief(permission) {
            self.update_write_gate();
        }
    }

    fn apply_snapshot(&mut self, document: DocumentSnapshot, permission: PermissionMode) {
        {
            let _guard = RemoteApply::begin(&self.extractor);
            self.surface.restore(document, ChangeOrigin::Remote);
        }
        self.stats.snapshots_applied += 1;

        self.permission.adopt(permission);
        self.update_write_gate();
        self.notices.push(Notice::Synchronized);

        if let Some(cache) = self.cache.as_mut() {
            if let Err(e) = cache.save(&self.surface.full_state()) {
                log::warn!("Failed to cache received snapshot: {}", e);
            }
        }
    }

    fn apply_permission(&mut self, permission: PermissionMode) {
        let notice = self.permission.apply_authoritative(permission);
        self.stats.permissions_applied += 1;
        self.update_write_gate();
        self.notices.extend(notice);
    }

    // --- Outbound ---

    fn send_message(&mut self, msg: &WhiteboardMessage) -> bool {
        let bytes = match protocol::encode(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to encode {}: {}", msg.kind(), e);
                return false;
            }
        };
        let options = if msg.is_reliable() {
            SendOptions::reliable()
        } else {
            SendOptions::unreliable()
        };
        match self.transport.send(&bytes, options) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Error sending whiteboard {}: {}", msg.kind(), e);
                self.stats.send_failures += 1;
                false
            }
        }
    }

    fn send_snapshot(&mut self) {
        let msg = WhiteboardMessage::Snapshot {
            document: self.surface.full_state(),
            permission: self.permission.current(),
        };
        if self.send_message(&msg) {
            self.stats.snapshots_sent += 1;
            log::info!("Sent whiteboard snapshot to room {}", self.room_id);
        }
    }

    fn flush_deltas(&mut self, now: Instant) {
        let Some(batch) = self.extractor.borrow_mut().flush(now) else {
            return;
        };
        let msg = WhiteboardMessage::Delta {
            added: batch.added,
            updated: batch.updated,
            removed_ids: batch.removed,
            permission: self.permission.current(),
        };
        if self.send_message(&msg) {
            self.stats.deltas_sent += 1;
        }
    }

    // --- Helpers ---

    fn update_write_gate(&mut self) {
        let writable = self.permission.can_local_write();
        self.extractor.borrow_mut().set_writable(writable);
    }

    fn observe_document_change(&mut self, now: Instant) {
        if self.document_changed.replace(false) {
            if let Some(cache) = self.cache.as_mut() {
                cache.mark_dirty(now);
            }
        }
    }

    fn persist(&mut self, now: Instant) {
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        let surface = &self.surface;
        if let Err(e) = cache.maybe_save(now, || surface.full_state()) {
            log::warn!("Failed to cache whiteboard: {}", e);
        }
    }
}
