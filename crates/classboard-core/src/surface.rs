//! Drawing surface contract.
//!
//! The surface is the local editing layer that owns the document replica. It
//! applies record-level mutations transactionally and reports every mutation on
//! a change feed tagged with its origin. [`RecordStore`](crate::RecordStore) is
//! the in-crate implementation; hosts embedding a real canvas implement this
//! trait on top of it.

use crate::record::{DocumentSnapshot, Record, RecordId};

/// Where a mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Authored by the local user.
    Local,
    /// Replayed from another peer (delta, snapshot) or restored programmatically.
    Remote,
}

/// Change feed subscription filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFilter {
    origin: Option<ChangeOrigin>,
}

impl ChangeFilter {
    /// Match every change.
    pub fn any() -> Self {
        Self { origin: None }
    }

    /// Match only locally authored changes.
    pub fn local() -> Self {
        Self {
            origin: Some(ChangeOrigin::Local),
        }
    }

    /// Match only changes applied on behalf of other peers.
    pub fn remote() -> Self {
        Self {
            origin: Some(ChangeOrigin::Remote),
        }
    }

    pub fn matches(&self, origin: ChangeOrigin) -> bool {
        self.origin.is_none_or(|o| o == origin)
    }
}

/// A set of record mutations to apply in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub added: Vec<Record>,
    pub updated: Vec<Record>,
    pub removed: Vec<RecordId>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, record: Record) -> Self {
        self.added.push(record);
        self
    }

    pub fn update(mut self, record: Record) -> Self {
        self.updated.push(record);
        self
    }

    pub fn remove(mut self, id: impl Into<RecordId>) -> Self {
        self.removed.push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// What actually changed in the document after a batch was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<Record>,
    pub updated: Vec<Record>,
    pub removed: Vec<RecordId>,
    pub origin: ChangeOrigin,
}

impl ChangeSet {
    pub fn new(origin: ChangeOrigin) -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            origin,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Change feed callback.
pub type ChangeListener = Box<dyn FnMut(&ChangeSet)>;

/// Handle returned by [`DrawingSurface::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// The editing surface the sync engine drives.
pub trait DrawingSurface {
    /// Upsert `added` and `updated` by id, delete `removed` by id.
    fn apply_batch(&mut self, batch: &Batch, origin: ChangeOrigin);

    /// Full current document.
    fn full_state(&self) -> DocumentSnapshot;

    /// Replace the whole document atomically.
    fn restore(&mut self, snapshot: DocumentSnapshot, origin: ChangeOrigin);

    /// Register a change feed listener.
    fn subscribe(&mut self, filter: ChangeFilter, listener: ChangeListener) -> SubscriptionId;

    /// Remove a listener. Returns false if it was not registered.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Whether the surface has finished mounting and can be rendered.
    fn is_ready(&self) -> bool {
        true
    }
}
