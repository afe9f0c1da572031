//! In-memory record store.

use crate::record::{DocumentSnapshot, Record, RecordId};
use crate::surface::{
    Batch, ChangeFilter, ChangeListener, ChangeOrigin, ChangeSet, DrawingSurface, SubscriptionId,
};
use std::collections::BTreeMap;

/// A registered change feed listener.
struct Subscriber {
    id: SubscriptionId,
    filter: ChangeFilter,
    listener: ChangeListener,
}

/// Authoritative local replica of the whiteboard document.
///
/// Mutations are applied transactionally: each `apply_batch` or `restore` call
/// computes the effective change first, then notifies matching subscribers
/// once. Re-applying records that are already present with the same value is
/// not reported.
#[derive(Default)]
pub struct RecordStore {
    records: BTreeMap<RecordId, Record>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl RecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a snapshot. No change is emitted.
    pub fn from_snapshot(snapshot: DocumentSnapshot) -> Self {
        Self {
            records: snapshot.store,
            ..Self::default()
        }
    }

    /// Get a record by id.
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.keys()
    }

    /// Iterate over all records.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Full current document.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot::from_records(self.records.values().cloned())
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Upsert a single record into `changes`, skipping no-op writes.
    fn upsert(&mut self, record: &Record, changes: &mut ChangeSet) {
        match self.records.get(&record.id) {
            Some(existing) if existing == record => {}
            Some(_) => {
                self.records.insert(record.id.clone(), record.clone());
                changes.updated.push(record.clone());
            }
            None => {
                self.records.insert(record.id.clone(), record.clone());
                changes.added.push(record.clone());
            }
        }
    }

    fn notify(&mut self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        for subscriber in self.subscribers.iter_mut() {
            if subscriber.filter.matches(changes.origin) {
                (subscriber.listener)(changes);
            }
        }
    }
}

impl DrawingSurface for RecordStore {
    fn apply_batch(&mut self, batch: &Batch, origin: ChangeOrigin) {
        let mut changes = ChangeSet::new(origin);

        for record in batch.added.iter().chain(batch.updated.iter()) {
            self.upsert(record, &mut changes);
        }
        for id in &batch.removed {
            if self.records.remove(id).is_some() {
                changes.removed.push(id.clone());
            }
        }

        self.notify(&changes);
    }

    fn full_state(&self) -> DocumentSnapshot {
        self.snapshot()
    }

    fn restore(&mut self, snapshot: DocumentSnapshot, origin: ChangeOrigin) {
        let mut changes = ChangeSet::new(origin);
        let previous = std::mem::replace(&mut self.records, snapshot.store);

        for (id, record) in &self.records {
            match previous.get(id) {
                Some(old) if old == record => {}
                Some(_) => changes.updated.push(record.clone()),
                None => changes.added.push(record.clone()),
            }
        }
        for id in previous.keys() {
            if !self.records.contains_key(id) {
                changes.removed.push(id.clone());
            }
        }

        self.notify(&changes);
    }

    fn subscribe(&mut self, filter: ChangeFilter, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push(Subscriber {
            id,
            filter,
            listener,
        });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }
}
