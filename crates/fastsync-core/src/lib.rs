//! Fastsync core.
//!
//! Sans-IO building blocks for a room-based WebSocket relay: connection ids,
//! per-connection session state, the per-room aggregated binary buffer, and
//! the JSON control message codec. Nothing here touches a socket or a clock;
//! `fastsync-server` feeds events in and executes the resulting actions.
//!
//! # Components
//!
//! - [`IdAllocator`]: lowest-free-slot connection ids, slot 0 reserved
//! - [`Connection`]: room membership, max payload size, liveness flag
//! - [`Room`]: member list plus fixed-offset shared buffer with dirty tracking
//! - [`Inbound`] / [`Outbound`]: control message parsing and encoding

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod ids;
pub mod message;
pub mod room;

pub use connection::{Connection, Heartbeat};
pub use error::{ProtocolError, RoomError};
pub use ids::{ConnId, IdAllocator, RESERVED_ID};
pub use message::{HANDSHAKE, Inbound, Outbound, PING_LITERAL, PONG_LITERAL, UPDATE_USERS};
pub use room::Room;
