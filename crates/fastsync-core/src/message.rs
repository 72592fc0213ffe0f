//! Control message codec.
//!
//! Text frames carry compact JSON arrays of the form `[tag, ...fields]`, with
//! one exception: the latency probe is the bare literal [`PING_LITERAL`] and
//! is answered with the bare literal [`PONG_LITERAL`].
//!
//! | Direction | Shape                                  |
//! |-----------|----------------------------------------|
//! | out       | `["HANDSHAKE", id]` right after connect |
//! | in        | `["HANDSHAKE", room_key]`              |
//! | out       | `["UPDATE_USERS", [id, ...]]`          |
//! | in        | `[tag, target, payload]`               |
//! | in        | `[tag, payload]`                       |
//! | out       | `[tag, sender_id, payload]`            |
//!
//! Relay payloads are opaque JSON values and are forwarded untouched.

use serde_json::{Value, json};

use crate::{error::ProtocolError, ids::ConnId};

/// Application-level latency probe.
pub const PING_LITERAL: &str = "__ping__";

/// Reply to [`PING_LITERAL`].
pub const PONG_LITERAL: &str = "__pong__";

/// Tag for id assignment (outbound) and room join (inbound).
pub const HANDSHAKE: &str = "HANDSHAKE";

/// Tag for membership notifications.
pub const UPDATE_USERS: &str = "UPDATE_USERS";

/// A parsed inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Latency probe; answer with [`Outbound::Pong`].
    Probe,

    /// Join (or switch to) a room.
    Join {
        /// Opaque room key chosen by the client
        room_key: String,
    },

    /// `[tag, payload]`: relay to every connected session.
    Relay {
        /// Application tag
        tag: String,
        /// Opaque payload
        payload: Value,
    },

    /// `[tag, target, payload]`: relay to every connected session.
    ///
    /// The target field is carried but not used for routing.
    RelayTargeted {
        /// Application tag
        tag: String,
        /// Intended recipient as sent by the client
        target: Value,
        /// Opaque payload
        payload: Value,
    },
}

impl Inbound {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text == PING_LITERAL {
            return Ok(Self::Probe);
        }

        let value: Value = serde_json::from_str(text)?;
        let Value::Array(mut fields) = value else {
            return Err(ProtocolError::NotAnArray);
        };

        let tag = match fields.first() {
            Some(Value::String(tag)) => tag.clone(),
            _ => return Err(ProtocolError::MissingTag),
        };

        if tag == HANDSHAKE {
            return match fields.get_mut(1).map(Value::take) {
                Some(Value::String(room_key)) => Ok(Self::Join { room_key }),
                _ => Err(ProtocolError::InvalidRoomKey),
            };
        }

        match fields.len() {
            3 => {
                let payload = fields[2].take();
                let target = fields[1].take();
                Ok(Self::RelayTargeted { tag, target, payload })
            },
            2 => {
                let payload = fields[1].take();
                Ok(Self::Relay { tag, payload })
            },
            n => Err(ProtocolError::UnsupportedArity { tag, fields: n }),
        }
    }
}

/// A text frame the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Id assignment, sent once right after connect.
    Handshake(ConnId),

    /// Current room membership in join order.
    UpdateUsers(Vec<ConnId>),

    /// Relayed application message stamped with the sender's id.
    Relay {
        /// Application tag
        tag: String,
        /// Id of the sending connection
        sender: ConnId,
        /// Payload as received
        payload: Value,
    },

    /// Latency probe reply.
    Pong,
}

impl Outbound {
    /// Encode as wire text.
    pub fn encode(&self) -> String {
        match self {
            Self::Handshake(id) => json!([HANDSHAKE, id]).to_string(),
            Self::UpdateUsers(ids) => json!([UPDATE_USERS, ids]).to_string(),
            Self::Relay { tag, sender, payload } => json!([tag, sender, payload]).to_string(),
            Self::Pong => PONG_LITERAL.to_string(),
        }
    }
}
