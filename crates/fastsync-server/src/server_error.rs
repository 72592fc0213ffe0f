//! Driver error types.
//!
//! Provides strongly-typed errors for driver operations:
//! - Session lookup (events for sessions the driver does not know)
//! - Room buffer operations (membership, reservation, writes)
//! - Action execution (delivering messages to sessions)

use std::fmt;

use fastsync_core::{ConnId, RoomError};

/// Errors that can occur while the driver processes an event.
#[derive(Debug)]
pub enum DriverError {
    /// Session not found.
    ///
    /// A text or binary frame arrived for a session the driver never
    /// accepted or has already closed. The frame is dropped.
    SessionNotFound(ConnId),

    /// Room missing from the directory.
    ///
    /// A connection records a room key that has no directory entry. Rooms
    /// with members are never evicted, so this indicates a logic bug.
    RoomNotFound(String),

    /// Room buffer operation failed.
    ///
    /// Wraps errors from [`fastsync_core::Room`]. An allocation failure is
    /// fatal for that room; other variants indicate a logic bug.
    Room(RoomError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::RoomNotFound(key) => write!(f, "room not found: {key:?}"),
            Self::Room(err) => write!(f, "room error: {err}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Room(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RoomError> for DriverError {
    fn from(err: RoomError) -> Self {
        Self::Room(err)
    }
}

/// Errors from action execution.
#[derive(Debug)]
pub enum ExecutorError {
    /// Send to session failed.
    ///
    /// The session's writer task is gone, usually because the socket closed
    /// between the driver producing the action and the runtime executing it.
    /// Other sessions are unaffected.
    SendFailed {
        /// Session that failed
        session_id: ConnId,
        /// Error message
        reason: String,
    },

    /// Session has no registered writer.
    ///
    /// The session was terminated or has not finished registering.
    UnknownSession(ConnId),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendFailed { session_id, reason } => {
                write!(f, "send failed for session {session_id}: {reason}")
            },
            Self::UnknownSession(id) => write!(f, "no writer for session {id}"),
        }
    }
}

impl std::error::Error for ExecutorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let err = DriverError::SessionNotFound(42);
        assert_eq!(err.to_string(), "session not found: 42");

        let err = DriverError::RoomNotFound("lobby".to_string());
        assert_eq!(err.to_string(), "room not found: \"lobby\"");

        let err = DriverError::from(RoomError::NotAMember(3));
        assert_eq!(err.to_string(), "room error: connection 3 is not a member of this room");
    }

    #[test]
    fn executor_error_display() {
        let err = ExecutorError::SendFailed { session_id: 42, reason: "closed".to_string() };
        assert_eq!(err.to_string(), "send failed for session 42: closed");

        let err = ExecutorError::UnknownSession(7);
        assert_eq!(err.to_string(), "no writer for session 7");
    }
}
