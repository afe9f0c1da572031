//! In-process room for testing and local simulation.

use super::{SendOptions, Transport, TransportError};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// A payload delivered to a peer's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub payload: Vec<u8>,
    pub reliable: bool,
}

#[derive(Default)]
struct RoomState {
    inboxes: BTreeMap<String, VecDeque<Envelope>>,
    drop_unreliable: bool,
    fail_sends: bool,
    sent: usize,
}

/// Broadcast room shared by every [`MemoryPeer`] connected to it.
///
/// Sends fan out to every other connected peer, never back to the sender.
/// Peers that connect later do not see earlier messages.
#[derive(Clone, Default)]
pub struct MemoryRoom {
    state: Rc<RefCell<RoomState>>,
}

impl MemoryRoom {
    /// Create an empty room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room under `identity`.
    pub fn connect(&self, identity: &str) -> MemoryPeer {
        self.state
            .borrow_mut()
            .inboxes
            .entry(identity.to_string())
            .or_default();
        MemoryPeer {
            identity: identity.to_string(),
            room: self.clone(),
        }
    }

    /// Leave the room, discarding undelivered payloads.
    pub fn disconnect(&self, identity: &str) {
        self.state.borrow_mut().inboxes.remove(identity);
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.state.borrow().inboxes.contains_key(identity)
    }

    pub fn peer_count(&self) -> usize {
        self.state.borrow().inboxes.len()
    }

    /// Lose every unreliable payload from now on.
    pub fn set_drop_unreliable(&self, drop: bool) {
        self.state.borrow_mut().drop_unreliable = drop;
    }

    /// Make every send fail from now on.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.borrow_mut().fail_sends = fail;
    }

    /// Total payloads accepted for delivery.
    pub fn sent_count(&self) -> usize {
        self.state.borrow().sent
    }

    /// Take every pending payload addressed to `identity`.
    pub fn drain(&self, identity: &str) -> Vec<Envelope> {
        self.state
            .borrow_mut()
            .inboxes
            .get_mut(identity)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    fn broadcast(&self, from: &str, payload: &[u8], options: SendOptions) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if !state.inboxes.contains_key(from) {
            return Err(TransportError::NotConnected);
        }
        if state.fail_sends {
            return Err(TransportError::SendFailed("room unavailable".to_string()));
        }
        state.sent += 1;
        if !options.reliable && state.drop_unreliable {
            log::debug!("Dropping unreliable payload from {}", from);
            return Ok(());
        }

        for (identity, inbox) in state.inboxes.iter_mut() {
            if identity != from {
                inbox.push_back(Envelope {
                    sender: from.to_string(),
                    payload: payload.to_vec(),
                    reliable: options.reliable,
                });
            }
        }
        Ok(())
    }
}

/// One participant's handle on a [`MemoryRoom`].
#[derive(Clone)]
pub struct MemoryPeer {
    identity: String,
    room: MemoryRoom,
}

impl MemoryPeer {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn room(&self) -> &MemoryRoom {
        &self.room
    }

    /// Take every pending payload addressed to this peer.
    pub fn drain(&self) -> Vec<Envelope> {
        self.room.drain(&self.identity)
    }
}

impl Transport for MemoryPeer {
    fn local_identity(&self) -> &str {
        &self.identity
    }

    fn send(&self, payload: &[u8], options: SendOptions) -> Result<(), TransportError> {
        self.room.broadcast(&self.identity, payload, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_without_echo() {
        let room = MemoryRoom::new();
        let a = room.connect("a");
        let b = room.connect("b");
        let c = room.connect("c");

        a.send(b"hello", SendOptions::unreliable()).unwrap();

        assert!(a.drain().is_empty());
        assert_eq!(b.drain()[0].payload, b"hello".to_vec());
        let from_c = c.drain();
        assert_eq!(from_c[0].sender, "a");
        assert!(!from_c[0].reliable);
    }

    #[test]
    fn test_late_joiner_misses_earlier_messages() {
        let room = MemoryRoom::new();
        let a = room.connect("a");
        a.send(b"early", SendOptions::reliable()).unwrap();

        let late = room.connect("late");
        assert!(late.drain().is_empty());
    }

    #[test]
    fn test_drop_unreliable_keeps_reliable() {
        let room = MemoryRoom::new();
        let a = room.connect("a");
        let b = room.connect("b");
        room.set_drop_unreliable(true);

        a.send(b"lossy", SendOptions::unreliable()).unwrap();
        a.send(b"important", SendOptions::reliable()).unwrap();

        let inbox = b.drain();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].payload, b"important".to_vec());
        assert_eq!(room.sent_count(), 2);
    }

    #[test]
    fn test_send_errors() {
        let room = MemoryRoom::new();
        let a = room.connect("a");
        room.set_fail_sends(true);
        assert!(matches!(a.send(b"x", SendOptions::reliable()), Err(TransportError::SendFailed(_))));
        assert_eq!(room.sent_count(), 0);

        room.set_fail_sends(false);
        assert!(room.is_connected("a"));
        room.disconnect("a");
        assert!(!room.is_connected("a"));
        assert_eq!(a.send(b"x", SendOptions::reliable()), Err(TransportError::NotConnected));
        assert_eq!(room.peer_count(), 0);
    }
}
