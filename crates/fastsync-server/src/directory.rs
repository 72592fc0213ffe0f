//! Room directory.
//!
//! Maps room keys to [`Room`] state. Rooms are created lazily on the first
//! handshake that names them. Whether empty rooms are ever removed is the
//! driver's decision (see `DriverConfig::evict_empty_rooms`); the directory
//! itself only stores them.

use std::collections::HashMap;

use fastsync_core::Room;

/// Room key → room state.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Room for `key`, creating an empty one if absent.
    pub fn get_or_create(&mut self, key: &str) -> &mut Room {
        self.rooms.entry(key.to_string()).or_default()
    }

    /// Room for `key`. `None` if it was never created (or was evicted).
    pub fn get(&self, key: &str) -> Option<&Room> {
        self.rooms.get(key)
    }

    /// Mutable room for `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Room> {
        self.rooms.get_mut(key)
    }

    /// Remove a room, returning its final state.
    pub fn remove(&mut self, key: &str) -> Option<Room> {
        self.rooms.remove(key)
    }

    /// Whether a room exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.rooms.contains_key(key)
    }

    /// All rooms, for the sync tick.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Room)> {
        self.rooms.iter_mut().map(|(key, room)| (key.as_str(), room))
    }

    /// Number of rooms, empty ones included.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// No rooms exist.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
