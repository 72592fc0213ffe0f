//! Per-connection session state.
//!
//! Tracks the room a connection belongs to, the largest binary payload it has
//! sent, and the liveness flag driven by the heartbeat. Like the rest of this
//! crate it performs no I/O: [`Connection::heartbeat`] returns what the driver
//! should do and the driver turns that into transport actions.
//!
//! # Liveness
//!
//! ```text
//!            heartbeat: probe           heartbeat: expire
//! ┌───────┐ ───────────────> ┌────────┐ ────────────────> terminate
//! │ alive │                  │ probed │
//! └───────┘ <─────────────── └────────┘
//!                 pong
//! ```

use crate::ids::ConnId;

/// Result of a heartbeat pass over one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    /// Connection answered the previous probe; send a new one.
    Probe,
    /// No answer since the last probe; terminate the connection.
    Expired,
}

/// State attached to one live socket session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnId,
    /// Room joined via handshake, if any
    room_key: Option<String>,
    /// Largest binary payload observed so far
    max_payload_size: usize,
    /// Cleared by each heartbeat, set again by a pong
    alive: bool,
}

impl Connection {
    /// Fresh connection: no room, no payload seen, alive.
    pub fn new(id: ConnId) -> Self {
        Self { id, room_key: None, max_payload_size: 0, alive: true }
    }

    /// Id assigned at connect.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Room this connection joined. `None` before the first handshake.
    pub fn room_key(&self) -> Option<&str> {
        self.room_key.as_deref()
    }

    /// Record a handshake into `room_key`, returning the previous room.
    pub fn set_room(&mut self, room_key: impl Into<String>) -> Option<String> {
        self.room_key.replace(room_key.into())
    }

    /// Largest binary payload this connection has sent.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Observe a binary payload of `len` bytes.
    ///
    /// Returns `true` when the payload raised the maximum, meaning the room
    /// buffer has to be resized. The maximum never decreases.
    pub fn observe_payload(&mut self, len: usize) -> bool {
        if len > self.max_payload_size {
            self.max_payload_size = len;
            true
        } else {
            false
        }
    }

    /// Whether the peer answered the last probe.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Pong received.
    pub fn mark_alive(&mut self) {
        self.alive = true;
    }

    /// Advance the liveness state by one heartbeat interval.
    pub fn heartbeat(&mut self) -> Heartbeat {
        if self.alive {
            self.alive = false;
            Heartbeat::Probe
        } else {
            Heartbeat::Expired
        }
    }
}
