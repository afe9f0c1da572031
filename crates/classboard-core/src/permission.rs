//! Whiteboard write-access control.
//!
//! The session authority (the professor) decides whether only they or every
//! peer may draw. The mode is owned by one [`PermissionController`] per open
//! whiteboard and is never persisted.

use crate::notice::Notice;
use crate::protocol::{self, WhiteboardMessage};
use crate::transport::{SendOptions, Transport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who may write on the whiteboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionMode {
    /// Only the session authority may draw.
    #[default]
    AuthorityOnly,
    /// Every peer may draw.
    AllPeers,
}

impl PermissionMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Self::AuthorityOnly => Self::AllPeers,
            Self::AllPeers => Self::AuthorityOnly,
        }
    }

    /// Whether a peer with the given role may write under this mode.
    pub fn allows_write(self, is_authority: bool) -> bool {
        is_authority || self == Self::AllPeers
    }
}

/// Role of the local peer in the session, resolved by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Authority,
    Participant,
}

impl Role {
    pub fn is_authority(self) -> bool {
        self == Self::Authority
    }
}

/// Permission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("only the session authority can change whiteboard permissions")]
    NotAuthority,
}

/// Holds the current mode and gates local writing.
#[derive(Debug, Clone)]
pub struct PermissionController {
    mode: PermissionMode,
    role: Role,
}

impl PermissionController {
    /// Create a controller in `AuthorityOnly` mode.
    pub fn new(role: Role) -> Self {
        Self {
            mode: PermissionMode::AuthorityOnly,
            role,
        }
    }

    pub fn current(&self) -> PermissionMode {
        self.mode
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role.is_authority()
    }

    /// Whether the local peer may mutate the document right now.
    pub fn can_local_write(&self) -> bool {
        self.mode.allows_write(self.is_authority())
    }

    /// Flip the mode and broadcast it reliably. Authority only.
    ///
    /// The local mode changes before the broadcast; a failed send is logged and
    /// does not roll the change back.
    pub fn toggle<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<Notice, PermissionError> {
        if !self.is_authority() {
            log::warn!("Rejected permission toggle from non-authority peer");
            return Err(PermissionError::NotAuthority);
        }

        self.mode = self.mode.toggled();
        log::info!("Whiteboard permission set to {:?}", self.mode);

        let msg = WhiteboardMessage::Permission {
            permission: self.mode,
        };
        match protocol::encode(&msg) {
            Ok(bytes) => {
                if let Err(e) = transport.send(&bytes, SendOptions::reliable()) {
                    log::warn!("Failed to broadcast permission change: {}", e);
                }
            }
            Err(e) => log::error!("Failed to encode permission message: {}", e),
        }

        Ok(Notice::PermissionSet(self.mode))
    }

    /// Adopt a mode received on the authoritative channel.
    ///
    /// Returns the notice to show a non-authority user.
    pub fn apply_authoritative(&mut self, mode: PermissionMode) -> Option<Notice> {
        self.mode = mode;
        if self.is_authority() {
            return None;
        }
        Some(match mode {
            PermissionMode::AllPeers => Notice::WriteAccessGranted,
            PermissionMode::AuthorityOnly => Notice::ReadOnly,
        })
    }

    /// Adopt a mode silently (snapshot channel).
    pub fn adopt(&mut self, mode: PermissionMode) {
        self.mode = mode;
    }

    /// Consider the sender's belief carried on a delta.
    ///
    /// The authority owns the mode and ignores beliefs. Returns true if the
    /// local mode changed.
    pub fn observe_belief(&mut self, mode: PermissionMode) -> bool {
        if self.is_authority() || self.mode == mode {
            return false;
        }
        log::debug!("Adopting permission {:?} from delta traffic", mode);
        self.mode = mode;
        true
    }

    /// Back to the initial mode.
    pub fn reset(&mut self) {
        self.mode = PermissionMode::AuthorityOnly;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryRoom;

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&PermissionMode::AuthorityOnly).unwrap(), "\"AUTHORITY_ONLY\"");
        assert_eq!(serde_json::to_string(&PermissionMode::AllPeers).unwrap(), "\"ALL_PEERS\"");
    }

    #[test]
    fn test_can_local_write() {
        let mut student = PermissionController::new(Role::Participant);
        assert!(!student.can_local_write());
        student.adopt(PermissionMode::AllPeers);
        assert!(student.can_local_write());

        let professor = PermissionController::new(Role::Authority);
        assert!(professor.can_local_write());
    }

    #[test]
    fn test_toggle_broadcasts_reliably() {
        let room = MemoryRoom::new();
        let host = room.connect("host");
        let student = room.connect("student");

        let mut controller = PermissionController::new(Role::Authority);
        let notice = controller.toggle(&host).unwrap();

        assert_eq!(notice, Notice::PermissionSet(PermissionMode::AllPeers));
        assert_eq!(controller.current(), PermissionMode::AllPeers);

        let inbox = student.drain();
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].reliable);
        let msg = protocol::decode(&inbox[0].payload).unwrap();
        assert_eq!(msg, WhiteboardMessage::Permission { permission: PermissionMode::AllPeers });
    }

    #[test]
    fn test_toggle_rejected_for_participant() {
        let room = MemoryRoom::new();
        let host = room.connect("host");
        let student = room.connect("student");

        let mut controller = PermissionController::new(Role::Participant);
        assert_eq!(controller.toggle(&student), Err(PermissionError::NotAuthority));
        assert_eq!(controller.current(), PermissionMode::AuthorityOnly);
        assert!(host.drain().is_empty());
    }

    #[test]
    fn test_toggle_survives_send_failure() {
        let room = MemoryRoom::new();
        let host = room.connect("host");
        room.set_fail_sends(true);

        let mut controller = PermissionController::new(Role::Authority);
        assert!(controller.toggle(&host).is_ok());
        assert_eq!(controller.current(), PermissionMode::AllPeers);
    }

    #[test]
    fn test_authoritative_notices() {
        let mut student = PermissionController::new(Role::Participant);
        assert_eq!(student.apply_authoritative(PermissionMode::AllPeers), Some(Notice::WriteAccessGranted));
        assert_eq!(student.apply_authoritative(PermissionMode::AuthorityOnly), Some(Notice::ReadOnly));

        let mut professor = PermissionController::new(Role::Authority);
        assert_eq!(professor.apply_authoritative(PermissionMode::AllPeers), None);
        assert_eq!(professor.current(), PermissionMode::AllPeers);
    }

    #[test]
    fn test_authority_ignores_beliefs() {
        let mut professor = PermissionController::new(Role::Authority);
        assert!(!professor.observe_belief(PermissionMode::AllPeers));
        assert_eq!(professor.current(), PermissionMode::AuthorityOnly);

        let mut student = PermissionController::new(Role::Participant);
        assert!(student.observe_belief(PermissionMode::AllPeers));
        assert!(!student.observe_belief(PermissionMode::AllPeers));
    }
}
