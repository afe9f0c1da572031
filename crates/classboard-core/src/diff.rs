//! Outbound diff extraction.
//!
//! Turns the surface's local change feed into throttled, coalesced batches
//! ready to be sent as delta messages.

use crate::record::{Record, RecordId};
use crate::surface::{Batch, ChangeOrigin, ChangeSet};
use crate::Instant;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::rc::Rc;
use std::time::Duration;

/// Extractor shared between the engine and its change feed listener.
pub type SharedExtractor = Rc<RefCell<DiffExtractor>>;

/// Latest known state of one record inside the throttle window.
#[derive(Debug, Clone, PartialEq)]
enum PendingChange {
    Added(Record),
    Updated(Record),
    Removed,
}

/// Buffers local changes and releases at most one batch per throttle window.
///
/// Within a window only the latest value per record id is kept. An add
/// followed by a remove of the same id cancels out.
#[derive(Debug)]
pub struct DiffExtractor {
    pending: BTreeMap<RecordId, PendingChange>,
    applying_remote: bool,
    writable: bool,
    interval: Duration,
    last_emit: Option<Instant>,
}

impl DiffExtractor {
    pub fn new(interval: Duration, writable: bool) -> Self {
        Self {
            pending: BTreeMap::new(),
            applying_remote: false,
            writable,
            interval,
            last_emit: None,
        }
    }

    /// Wrap in the shared handle used by the change feed listener.
    pub fn shared(self) -> SharedExtractor {
        Rc::new(RefCell::new(self))
    }

    pub fn is_applying_remote(&self) -> bool {
        self.applying_remote
    }

    /// Mark the start of a remote batch. Nothing is extracted until `end_remote`.
    pub fn begin_remote(&mut self) {
        self.applying_remote = true;
    }

    pub fn end_remote(&mut self) {
        self.applying_remote = false;
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Allow or forbid extraction. Losing write access discards pending changes.
    pub fn set_writable(&mut self, writable: bool) {
        if !writable && !self.pending.is_empty() {
            log::debug!("Discarding {} pending changes after losing write access", self.pending.len());
            self.pending.clear();
        }
        self.writable = writable;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Feed one change set from the surface.
    pub fn record(&mut self, changes: &ChangeSet) {
        if changes.origin != ChangeOrigin::Local || self.applying_remote {
            return;
        }
        if !self.writable {
            log::debug!("Ignoring local change on a read-only whiteboard");
            return;
        }

        for record in &changes.added {
            self.merge_added(record);
        }
        for record in &changes.updated {
            self.merge_updated(record);
        }
        for id in &changes.removed {
            self.merge_removed(id);
        }
    }

    fn merge_added(&mut self, record: &Record) {
        let next = match self.pending.get(&record.id) {
            None | Some(PendingChange::Added(_)) => PendingChange::Added(record.clone()),
            // It existed before the window; peers still have it.
            Some(PendingChange::Removed) | Some(PendingChange::Updated(_)) => PendingChange::Updated(record.clone()),
        };
        self.pending.insert(record.id.clone(), next);
    }

    fn merge_updated(&mut self, record: &Record) {
        let next = match self.pending.get(&record.id) {
            Some(PendingChange::Added(_)) => PendingChange::Added(record.clone()),
            _ => PendingChange::Updated(record.clone()),
        };
        self.pending.insert(record.id.clone(), next);
    }

    fn merge_removed(&mut self, id: &RecordId) {
        match self.pending.entry(id.clone()) {
            Entry::Occupied(entry) if matches!(entry.get(), PendingChange::Added(_)) => {
                entry.remove();
            }
            Entry::Occupied(mut entry) => {
                entry.insert(PendingChange::Removed);
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingChange::Removed);
            }
        }
    }

    /// When the next batch may leave, if anything is pending. Never earlier than `now`.
    pub fn next_flush_at(&self, now: Instant) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        Some(match self.last_emit {
            Some(last) => (last + self.interval).max(now),
            None => now,
        })
    }

    /// Release the pending batch if the throttle window allows it.
    pub fn flush(&mut self, now: Instant) -> Option<Batch> {
        if self.pending.is_empty() || !self.writable {
            return None;
        }
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }

        let mut batch = Batch::new();
        for (id, change) in std::mem::take(&mut self.pending) {
            match change {
                PendingChange::Added(record) => batch.added.push(record),
                PendingChange::Updated(record) => batch.updated.push(record),
                PendingChange::Removed => batch.removed.push(id),
            }
        }
        self.last_emit = Some(now);
        Some(batch)
    }

    /// Drop everything pending.
    pub fn discard(&mut self) {
        self.pending.clear();
    }
}

/// Scope guard holding the re-entrancy flag while a remote batch is applied.
pub struct RemoteApply {
    extractor: SharedExtractor,
}

impl RemoteApply {
    pub fn begin(extractor: &SharedExtractor) -> Self {
        extractor.borrow_mut().begin_remote();
        Self {
            extractor: extractor.clone(),
        }
    }
}

impl Drop for RemoteApply {
    fn drop(&mut self) {
        self.extractor.borrow_mut().end_remote();
    }
}
