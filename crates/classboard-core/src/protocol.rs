//! Whiteboard wire protocol.
//!
//! Messages are JSON objects tagged by `kind`:
//! ```json
//! { "kind": "delta", "added": [...], "updated": [...], "removedIds": ["shape:1"], "permission": "ALL_PEERS" }
//! { "kind": "snapshot", "document": { "schema": 1, "store": { ... } }, "permission": "AUTHORITY_ONLY" }
//! { "kind": "permission", "permission": "ALL_PEERS" }
//! ```
//!
//! The room data channel is shared with other features (chat, reactions...),
//! so payloads with a `kind` this module does not own are reported as
//! [`ProtocolError::ForeignKind`] rather than as malformed.

use crate::permission::PermissionMode;
use crate::record::{DocumentSnapshot, Record, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Message kinds owned by the whiteboard.
pub const KNOWN_KINDS: [&str; 3] = ["delta", "snapshot", "permission"];

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Payload kind `{0}` is not a whiteboard message")]
    ForeignKind(String),
    #[error("Encoding error: {0}")]
    Encode(String),
}

/// A message exchanged between whiteboard peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WhiteboardMessage {
    /// Changes since the sender's last emission. Sent unreliably.
    Delta {
        #[serde(default)]
        added: Vec<Record>,
        #[serde(default)]
        updated: Vec<Record>,
        #[serde(rename = "removedIds", default)]
        removed_ids: Vec<RecordId>,
        /// The sender's belief of the current mode.
        permission: PermissionMode,
    },
    /// Full document and authoritative mode. Authority only, reliable.
    Snapshot {
        document: DocumentSnapshot,
        permission: PermissionMode,
    },
    /// Authoritative mode change. Authority only, reliable.
    Permission { permission: PermissionMode },
}

impl WhiteboardMessage {
    /// The wire `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::Snapshot { .. } => "snapshot",
            Self::Permission { .. } => "permission",
        }
    }

    /// Whether this kind must go over the reliable channel.
    pub fn is_reliable(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }

    /// The permission mode carried by every kind.
    pub fn permission(&self) -> PermissionMode {
        match self {
            Self::Delta { permission, .. }
            | Self::Snapshot { permission, .. }
            | Self::Permission { permission } => *permission,
        }
    }
}

/// Encode a message into a transport payload.
pub fn encode(msg: &WhiteboardMessage) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a transport payload.
pub fn decode(bytes: &[u8]) -> Result<WhiteboardMessage, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing `kind` field".to_string()))?;
    if !KNOWN_KINDS.contains(&kind) {
        return Err(ProtocolError::ForeignKind(kind.to_string()));
    }

    let msg: WhiteboardMessage =
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if let WhiteboardMessage::Snapshot { document, .. } = &msg {
        if let Some(key) = document.mismatched_key() {
            return Err(ProtocolError::Malformed(format!(
                "snapshot key `{}` does not match its record id",
                key
            )));
        }
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_wire_shape() {
        let msg = WhiteboardMessage::Delta {
            added: vec![Record::new("shape:1").with_field("x", 1)],
            updated: vec![],
            removed_ids: vec!["shape:2".into()],
            permission: PermissionMode::AllPeers,
        };
        let json: Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();

        assert_eq!(json["kind"], "delta");
        assert_eq!(json["added"][0]["id"], "shape:1");
        assert_eq!(json["removedIds"][0], "shape:2");
        assert_eq!(json["permission"], "ALL_PEERS");
    }

    #[test]
    fn test_snapshot_decodes() {
        let json = r#"{
            "kind": "snapshot",
            "document": { "schema": 1, "store": { "shape:a": { "id": "shape:a", "x": 4 } } },
            "permission": "AUTHORITY_ONLY"
        }"#;
        match decode(json.as_bytes()).unwrap() {
            WhiteboardMessage::Snapshot { document, permission } => {
                assert_eq!(document.len(), 1);
                assert_eq!(permission, PermissionMode::AuthorityOnly);
            }
            other => panic!("Wrong message kind: {}", other.kind()),
        }
    }

    #[test]
    fn test_snapshot_key_must_match_record_id() {
        let json = r#"{
            "kind": "snapshot",
            "document": { "schema": 1, "store": { "shape:a": { "id": "shape:b", "x": 1 } } },
            "permission": "AUTHORITY_ONLY"
        }"#;
        assert!(matches!(decode(json.as_bytes()), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_delta_lists_default_to_empty() {
        let msg = decode(br#"{"kind":"delta","permission":"ALL_PEERS"}"#).unwrap();
        assert_eq!(
            msg,
            WhiteboardMessage::Delta {
                added: vec![],
                updated: vec![],
                removed_ids: vec![],
                permission: PermissionMode::AllPeers,
            }
        );
    }

    #[test]
    fn test_reliability_by_kind() {
        let permission = WhiteboardMessage::Permission { permission: PermissionMode::AllPeers };
        let snapshot = WhiteboardMessage::Snapshot {
            document: DocumentSnapshot::default(),
            permission: PermissionMode::AuthorityOnly,
        };
        let delta = decode(br#"{"kind":"delta","permission":"ALL_PEERS"}"#).unwrap();
        assert!(permission.is_reliable());
        assert!(snapshot.is_reliable());
        assert!(!delta.is_reliable());
    }

    #[test]
    fn test_missing_kind_is_malformed() {
        let result = decode(br#"{"permission":"ALL_PEERS"}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(decode(b"\xff\x00not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode(b"[1,2,3]"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_bad_permission_value_is_malformed() {
        let result = decode(br#"{"kind":"permission","permission":"EVERYONE"}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_foreign_kind() {
        let result = decode(br#"{"kind":"chat","text":"hello"}"#);
        assert_eq!(result, Err(ProtocolError::ForeignKind("chat".to_string())));
    }
}
