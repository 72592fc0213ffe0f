//! Server driver.
//!
//! Ties together the id allocator, per-connection state, and the room
//! directory. The driver performs no I/O: the runtime feeds it
//! [`ServerEvent`]s and executes the [`ServerAction`]s it returns, which keeps
//! every protocol decision testable without sockets or timers.
//!
//! Events are processed one at a time to completion, so room membership and
//! buffer writes never interleave.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use fastsync_core::{ConnId, Connection, Heartbeat, IdAllocator, Inbound, Outbound, Room};
use serde_json::Value;

use crate::{directory::RoomDirectory, server_error::DriverError};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Emit join, leave, and resize diagnostics
    pub debug: bool,
    /// Interval between liveness probes
    pub heartbeat_interval: Duration,
    /// Interval between room buffer flushes
    pub sync_interval: Duration,
    /// Remove a room from the directory once its last member leaves
    pub evict_empty_rooms: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            debug: false,
            heartbeat_interval: Duration::from_secs(5),
            sync_interval: Duration::from_secs(1) / 30,
            evict_empty_rooms: false,
        }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the runtime. Connection acceptance goes through
/// [`ServerDriver::accept`] instead, because the driver assigns the id.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A text frame was received
    TextReceived {
        /// Connection that sent the frame
        session_id: ConnId,
        /// Frame contents
        text: String,
    },

    /// A binary frame was received
    BinaryReceived {
        /// Connection that sent the frame
        session_id: ConnId,
        /// Frame contents
        data: Bytes,
    },

    /// The transport delivered a pong
    PongReceived {
        /// Connection that answered
        session_id: ConnId,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: ConnId,
        /// Reason for closure
        reason: String,
    },

    /// Heartbeat interval elapsed
    HeartbeatTick,

    /// Sync interval elapsed
    SyncTick,
}

/// Frame to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Text frame (control message)
    Text(String),
    /// Binary frame (room buffer range)
    Binary(Bytes),
    /// Transport-level ping
    Ping,
}

/// Actions that the server driver produces.
///
/// These are executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a message to one session
    SendToSession {
        /// Target session
        session_id: ConnId,
        /// Message to send
        message: OutboundMessage,
    },

    /// Send the same message to several sessions
    Broadcast {
        /// Target sessions, in delivery order
        session_ids: Vec<ConnId>,
        /// Message to send
        message: OutboundMessage,
    },

    /// Forcibly close a connection. The driver has already run the
    /// disconnect procedure for it.
    Terminate {
        /// Session to close
        session_id: ConnId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Owns all shared state: the id slot table, live connections, and rooms.
pub struct ServerDriver {
    /// Connection id slots
    ids: IdAllocator,
    /// Live connections (ordered for deterministic broadcast order)
    connections: BTreeMap<ConnId, Connection>,
    /// Room key → room state
    directory: RoomDirectory,
    /// Driver configuration
    config: DriverConfig,
}

impl ServerDriver {
    /// Create a new server driver.
    pub fn new(config: DriverConfig) -> Self {
        Self {
            ids: IdAllocator::new(),
            connections: BTreeMap::new(),
            directory: RoomDirectory::new(),
            config,
        }
    }

    /// Register a new connection.
    ///
    /// Allocates the lowest free id and returns it together with the
    /// handshake that announces it to the client.
    pub fn accept(&mut self) -> (ConnId, Vec<ServerAction>) {
        let session_id = self.ids.allocate();
        self.connections.insert(session_id, Connection::new(session_id));

        let actions = vec![
            ServerAction::SendToSession {
                session_id,
                message: OutboundMessage::Text(Outbound::Handshake(session_id).encode()),
            },
            ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {session_id} accepted"),
            },
        ];

        (session_id, actions)
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::TextReceived { session_id, text } => {
                self.handle_text_received(session_id, &text)
            },
            ServerEvent::BinaryReceived { session_id, data } => {
                self.handle_binary_received(session_id, &data)
            },
            ServerEvent::PongReceived { session_id } => {
                if let Some(conn) = self.connections.get_mut(&session_id) {
                    conn.mark_alive();
                }
                Ok(Vec::new())
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                self.handle_connection_closed(session_id, &reason)
            },
            ServerEvent::HeartbeatTick => self.handle_heartbeat_tick(),
            ServerEvent::SyncTick => Ok(self.handle_sync_tick()),
        }
    }

    /// Route a control message.
    fn handle_text_received(
        &mut self,
        session_id: ConnId,
        text: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if !self.connections.contains_key(&session_id) {
            return Err(DriverError::SessionNotFound(session_id));
        }

        let inbound = match Inbound::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                return Ok(vec![ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("discarding control message from {session_id}: {e}"),
                }]);
            },
        };

        match inbound {
            Inbound::Probe => Ok(vec![ServerAction::SendToSession {
                session_id,
                message: OutboundMessage::Text(Outbound::Pong.encode()),
            }]),
            Inbound::Join { room_key } => self.handle_join(session_id, room_key),
            Inbound::Relay { tag, payload } | Inbound::RelayTargeted { tag, payload, .. } => {
                Ok(vec![self.relay(session_id, tag, payload)])
            },
        }
    }

    /// Join (or switch to) a room and announce the new membership.
    fn handle_join(
        &mut self,
        session_id: ConnId,
        room_key: String,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let mut actions = Vec::new();

        let conn = self
            .connections
            .get_mut(&session_id)
            .ok_or(DriverError::SessionNotFound(session_id))?;
        let reserved = conn.max_payload_size();
        let previous = conn.set_room(room_key.as_str());

        if let Some(previous) = previous.filter(|prev| *prev != room_key) {
            self.leave_room(session_id, &previous, &mut actions)?;
        }

        let room = self.directory.get_or_create(&room_key);
        let joined = room.join(session_id, reserved)?;
        let members = room.member_ids();

        if joined {
            let message = format!("connection {session_id} joined room {room_key:?}");
            self.diagnostic(&mut actions, message);
        }

        actions.push(ServerAction::Broadcast {
            session_ids: members.clone(),
            message: OutboundMessage::Text(Outbound::UpdateUsers(members).encode()),
        });

        Ok(actions)
    }

    /// Stamp a relayed message with its sender and address it to every
    /// live session, regardless of room.
    fn relay(&self, sender: ConnId, tag: String, payload: Value) -> ServerAction {
        ServerAction::Broadcast {
            session_ids: self.connections.keys().copied().collect(),
            message: OutboundMessage::Text(Outbound::Relay { tag, sender, payload }.encode()),
        }
    }

    /// Merge a binary frame into the sender's room buffer.
    fn handle_binary_received(
        &mut self,
        session_id: ConnId,
        data: &[u8],
    ) -> Result<Vec<ServerAction>, DriverError> {
        let conn = self
            .connections
            .get_mut(&session_id)
            .ok_or(DriverError::SessionNotFound(session_id))?;

        // Binary frames before a handshake have nowhere to go
        let Some(room_key) = conn.room_key().map(str::to_owned) else {
            return Ok(Vec::new());
        };

        let room = self
            .directory
            .get_mut(&room_key)
            .ok_or_else(|| DriverError::RoomNotFound(room_key.clone()))?;

        let resized =
            conn.observe_payload(data.len()) && room.reserve(session_id, conn.max_payload_size())?;
        room.write(session_id, data)?;

        let mut actions = Vec::new();
        if resized {
            let message = format!("room {room_key:?} resized to {} bytes", room.buffer_len());
            self.diagnostic(&mut actions, message);
        }

        Ok(actions)
    }

    /// Run the disconnect procedure. Unknown sessions are a no-op, so a
    /// close that races a heartbeat termination is harmless.
    fn handle_connection_closed(
        &mut self,
        session_id: ConnId,
        reason: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let Some(conn) = self.connections.remove(&session_id) else {
            return Ok(Vec::new());
        };

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {session_id} closed: {reason}"),
        }];

        // Release first so the id is reusable even if the leave fails
        self.ids.release(session_id);

        if let Some(room_key) = conn.room_key() {
            self.leave_room(session_id, room_key, &mut actions)?;
        }

        Ok(actions)
    }

    /// Remove `session_id` from `room_key` and notify the remaining members.
    fn leave_room(
        &mut self,
        session_id: ConnId,
        room_key: &str,
        actions: &mut Vec<ServerAction>,
    ) -> Result<(), DriverError> {
        let Some(room) = self.directory.get_mut(room_key) else {
            return Ok(());
        };

        if !room.leave(session_id)? {
            return Ok(());
        }

        let remaining = room.member_ids();
        self.diagnostic(actions, format!("connection {session_id} left room {room_key:?}"));

        if remaining.is_empty() {
            if self.config.evict_empty_rooms {
                self.directory.remove(room_key);
                self.diagnostic(actions, format!("room {room_key:?} evicted"));
            }
            return Ok(());
        }

        actions.push(ServerAction::Broadcast {
            session_ids: remaining.clone(),
            message: OutboundMessage::Text(Outbound::UpdateUsers(remaining).encode()),
        });

        Ok(())
    }

    /// Probe live connections and drop the ones that missed the last probe.
    fn handle_heartbeat_tick(&mut self) -> Result<Vec<ServerAction>, DriverError> {
        let mut actions = Vec::new();
        let mut expired = Vec::new();

        for (&session_id, conn) in &mut self.connections {
            match conn.heartbeat() {
                Heartbeat::Probe => actions.push(ServerAction::SendToSession {
                    session_id,
                    message: OutboundMessage::Ping,
                }),
                Heartbeat::Expired => expired.push(session_id),
            }
        }

        for session_id in expired {
            let reason = "heartbeat timeout".to_string();
            actions.extend(self.handle_connection_closed(session_id, &reason)?);
            actions.push(ServerAction::Terminate { session_id, reason });
        }

        Ok(actions)
    }

    /// Flush every dirty room to its members.
    ///
    /// The dirty range is snapshotted once per room and the room is marked
    /// clean before any send is issued, so every member receives the same
    /// bytes for a given tick.
    fn handle_sync_tick(&mut self) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        for (_, room) in self.directory.iter_mut() {
            let Some(range) = room.take_dirty() else {
                continue;
            };

            actions.push(ServerAction::Broadcast {
                session_ids: room.member_ids(),
                message: OutboundMessage::Binary(range),
            });
        }

        actions
    }

    fn diagnostic(&self, actions: &mut Vec<ServerAction>, message: String) {
        if self.config.debug {
            actions.push(ServerAction::Log { level: LogLevel::Info, message });
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connection state. `None` if the session is not live.
    pub fn connection(&self, session_id: ConnId) -> Option<&Connection> {
        self.connections.get(&session_id)
    }

    /// Ids of all live sessions in ascending order.
    pub fn session_ids(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.connections.keys().copied()
    }

    /// Room state. `None` if the room was never created or was evicted.
    pub fn room(&self, room_key: &str) -> Option<&Room> {
        self.directory.get(room_key)
    }

    /// Number of rooms in the directory, empty ones included.
    pub fn room_count(&self) -> usize {
        self.directory.len()
    }

    /// Members of a room in join order. Empty if the room does not exist.
    pub fn members(&self, room_key: &str) -> Vec<ConnId> {
        self.directory.get(room_key).map(Room::member_ids).unwrap_or_default()
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl Default for ServerDriver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl std::fmt::Debug for ServerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.connections.len())
            .field("room_count", &self.directory.len())
            .finish()
    }
}
