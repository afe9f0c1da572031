//! Room transport abstraction.
//!
//! The engine consumes an already-connected room channel: it only sends
//! payloads. Inbound payloads are pushed by the host through
//! [`SyncEngine::handle_payload`](crate::SyncEngine::handle_payload).

mod memory;

pub use memory::{Envelope, MemoryPeer, MemoryRoom};

use std::rc::Rc;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Delivery options for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    /// Reliable, ordered delivery to every currently connected peer.
    /// Unreliable sends may be dropped or reordered.
    pub reliable: bool,
}

impl SendOptions {
    pub fn reliable() -> Self {
        Self { reliable: true }
    }

    pub fn unreliable() -> Self {
        Self { reliable: false }
    }
}

/// A connected broadcast channel to the other peers of a room.
pub trait Transport {
    /// Identity of the local participant.
    fn local_identity(&self) -> &str;

    /// Broadcast a payload to every other peer in the room.
    fn send(&self, payload: &[u8], options: SendOptions) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn local_identity(&self) -> &str {
        (**self).local_identity()
    }

    fn send(&self, payload: &[u8], options: SendOptions) -> Result<(), TransportError> {
        (**self).send(payload, options)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn local_identity(&self) -> &str {
        (**self).local_identity()
    }

    fn send(&self, payload: &[u8], options: SendOptions) -> Result<(), TransportError> {
        (**self).send(payload, options)
    }
}
