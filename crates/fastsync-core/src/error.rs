//! Error types for the fastsync core.
//!
//! Two layers: control message parsing ([`ProtocolError`]) and room buffer
//! writes ([`RoomError`]). Both are per-connection failures; neither should
//! take down a room or other connections.

use thiserror::Error;

use crate::ids::ConnId;

/// A text frame that is not a usable control message.
///
/// The router discards these and keeps the connection open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Text is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON value is not an array
    #[error("control message must be an array")]
    NotAnArray,

    /// Array is empty or its first element is not a string
    #[error("control message tag must be a string")]
    MissingTag,

    /// `HANDSHAKE` without a string room key
    #[error("handshake requires a string room key")]
    InvalidRoomKey,

    /// Relay array with a length other than 2 or 3
    #[error("unsupported field count {fields} for tag {tag:?}")]
    UnsupportedArity {
        /// Message tag
        tag: String,
        /// Array length, tag included
        fields: usize,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

/// Errors from room buffer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Connection wrote to a room it is not a member of
    #[error("connection {0} is not a member of this room")]
    NotAMember(ConnId),

    /// Payload larger than the member's reserved region
    #[error("payload of {len} bytes exceeds reserved region of {reserved} bytes for connection {id}")]
    PayloadTooLarge {
        /// Writing connection
        id: ConnId,
        /// Payload length
        len: usize,
        /// Bytes reserved for this member
        reserved: usize,
    },

    /// Room buffer could not be reallocated. Fatal for the room.
    #[error("failed to allocate {size} byte room buffer: {reason}")]
    Allocation {
        /// Requested buffer size
        size: usize,
        /// Allocator error
        reason: String,
    },
}
