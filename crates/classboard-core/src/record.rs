//! Whiteboard records and full document snapshots.
//!
//! A record is an opaque drawable entity (shape, page, binding...). The sync
//! engine only looks at its identity; every other field is carried as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Current snapshot schema version.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Globally unique record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a fresh identifier with the given type prefix (e.g. `shape`).
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}:{}", prefix, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A drawable entity with a stable id and a bag of fields.
///
/// Serialized flat, so `{"id": "shape:1", "x": 10}` round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Get a field value.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field value, replacing any previous one.
    pub fn set_field(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }
}

/// Complete, self-sufficient description of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub schema: u32,
    pub store: BTreeMap<RecordId, Record>,
}

impl Default for DocumentSnapshot {
    fn default() -> Self {
        Self {
            schema: SNAPSHOT_SCHEMA_VERSION,
            store: BTreeMap::new(),
        }
    }
}

impl DocumentSnapshot {
    /// Build a snapshot from a set of records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            schema: SNAPSHOT_SCHEMA_VERSION,
            store: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// First store key that does not match the id of the record it holds.
    pub fn mismatched_key(&self) -> Option<&RecordId> {
        self.store.iter().find(|(key, record)| **key != record.id).map(|(key, _)| key)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat() {
        let record = Record::new("shape:1").with_field("x", 10).with_field("color", "red");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "shape:1");
        assert_eq!(json["x"], 10);
        assert_eq!(json["color"], "red");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let a = RecordId::generate("shape");
        let b = RecordId::generate("shape");
        assert!(a.as_str().starts_with("shape:"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = DocumentSnapshot::from_records([
            Record::new("shape:a").with_field("w", 3),
            Record::new("page:1").with_field("name", "Page 1"),
        ]);
        let json = snapshot.to_json().unwrap();
        let back = DocumentSnapshot::from_json(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_mismatched_key_detected() {
        assert!(DocumentSnapshot::from_records([Record::new("shape:a")]).mismatched_key().is_none());

        let mut snapshot = DocumentSnapshot::default();
        snapshot.store.insert("shape:a".into(), Record::new("shape:b"));
        assert_eq!(snapshot.mismatched_key(), Some(&RecordId::from("shape:a")));
    }
}
