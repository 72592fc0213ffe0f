//! Shared per-room state buffer.
//!
//! Every member owns a fixed region of the room buffer sized to the largest
//! payload it has ever sent. Regions are laid out back to back in join order,
//! so a member's offset is the sum of the reservations of the members before
//! it. Writes copy a payload into the writer's region and widen the dirty
//! range; the sync tick drains `[dirty_start, len)` and marks the room clean.
//!
//! ```text
//!  member:   A (10)        B (4)   C (6)
//!  buffer:  [0 ....... 10)[10..14)[14...20)
//! ```
//!
//! # Invariants
//!
//! - `buffer.len() == sum(member.reserved)` after every join, leave, and
//!   reservation change
//! - Any reallocation zero-fills the buffer and marks the room clean
//! - A shorter payload leaves the tail of the previous payload in place until
//!   the next resize or a longer write (members know their own lengths)

use std::ops::Range;

use bytes::Bytes;

use crate::{error::RoomError, ids::ConnId};

/// A room member and the bytes reserved for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Member {
    id: ConnId,
    reserved: usize,
}

/// Membership list and aggregated buffer for one room.
#[derive(Debug, Clone, Default)]
pub struct Room {
    /// Join order defines buffer layout
    members: Vec<Member>,
    buffer: Vec<u8>,
    /// Lowest offset written since the last flush. `None` when clean.
    dirty_start: Option<usize>,
}

impl Room {
    /// Empty room with a zero-length buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: ConnId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    /// Member ids in join order.
    pub fn member_ids(&self) -> Vec<ConnId> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append `id` with `reserved` bytes and resize.
    ///
    /// Returns `Ok(false)` without touching the buffer if `id` is already a
    /// member.
    pub fn join(&mut self, id: ConnId, reserved: usize) -> Result<bool, RoomError> {
        if self.contains(id) {
            return Ok(false);
        }

        self.members.push(Member { id, reserved });
        if let Err(e) = self.resize() {
            self.members.pop();
            return Err(e);
        }
        Ok(true)
    }

    /// Remove `id` and resize. Remaining members keep their relative order.
    ///
    /// Returns `Ok(false)` if `id` was not a member.
    pub fn leave(&mut self, id: ConnId) -> Result<bool, RoomError> {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);

        if self.members.len() == before {
            return Ok(false);
        }

        self.resize()?;
        Ok(true)
    }

    /// Raise the reservation of `id` to `reserved` bytes.
    ///
    /// Reservations only grow. Returns `Ok(true)` if the buffer was resized.
    pub fn reserve(&mut self, id: ConnId, reserved: usize) -> Result<bool, RoomError> {
        let member =
            self.members.iter_mut().find(|m| m.id == id).ok_or(RoomError::NotAMember(id))?;

        if reserved <= member.reserved {
            return Ok(false);
        }

        let previous = std::mem::replace(&mut member.reserved, reserved);
        if let Err(e) = self.resize() {
            if let Some(member) = self.members.iter_mut().find(|m| m.id == id) {
                member.reserved = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Bytes reserved for `id`. `None` if not a member.
    pub fn reserved(&self, id: ConnId) -> Option<usize> {
        self.members.iter().find(|m| m.id == id).map(|m| m.reserved)
    }

    /// Byte offset of `id`'s region. `None` if not a member.
    ///
    /// Recomputed from the membership list on every call.
    pub fn offset_of(&self, id: ConnId) -> Option<usize> {
        let mut offset = 0;
        for member in &self.members {
            if member.id == id {
                return Some(offset);
            }
            offset += member.reserved;
        }
        None
    }

    /// Byte range reserved for `id`. `None` if not a member.
    pub fn region_of(&self, id: ConnId) -> Option<Range<usize>> {
        let start = self.offset_of(id)?;
        let reserved = self.reserved(id)?;
        Some(start..start + reserved)
    }

    /// Copy `data` into `id`'s region and widen the dirty range.
    ///
    /// Returns the offset written at.
    pub fn write(&mut self, id: ConnId, data: &[u8]) -> Result<usize, RoomError> {
        let region = self.region_of(id).ok_or(RoomError::NotAMember(id))?;
        let reserved = region.len();

        if data.len() > reserved {
            return Err(RoomError::PayloadTooLarge { id, len: data.len(), reserved });
        }

        let offset = region.start;
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        self.dirty_start = Some(self.dirty_start.map_or(offset, |start| start.min(offset)));

        Ok(offset)
    }

    /// No unflushed writes.
    pub fn is_clean(&self) -> bool {
        self.dirty_start.is_none()
    }

    /// Lowest offset written since the last flush.
    pub fn dirty_start(&self) -> Option<usize> {
        self.dirty_start
    }

    /// Snapshot `[dirty_start, len)` and mark the room clean.
    ///
    /// Returns `None` when there is nothing to flush.
    pub fn take_dirty(&mut self) -> Option<Bytes> {
        let start = self.dirty_start.take()?;
        Some(Bytes::copy_from_slice(&self.buffer[start..]))
    }

    /// Whole buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Buffer length in bytes.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Reallocate to the sum of reservations, zero-filled and clean.
    fn resize(&mut self) -> Result<(), RoomError> {
        let size: usize = self.members.iter().map(|m| m.reserved).sum();

        // Shrinking reuses the allocation and cannot fail
        if size > self.buffer.capacity() {
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(size)
                .map_err(|e| RoomError::Allocation { size, reason: e.to_string() })?;
            self.buffer = buffer;
        } else {
            self.buffer.clear();
        }
        self.buffer.resize(size, 0);

        self.dirty_start = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with(members: &[(ConnId, usize)]) -> Room {
        let mut room = Room::new();
        for &(id, reserved) in members {
            room.join(id, reserved).unwrap();
        }
        room
    }

    #[test]
    fn new_room_is_empty_and_clean() {
        let room = Room::new();

        assert!(room.is_empty());
        assert!(room.is_clean());
        assert_eq!(room.buffer_len(), 0);
    }

    #[test]
    fn join_is_idempotent() {
        let mut room = room_with(&[(1, 10)]);

        assert!(!room.join(1, 10).unwrap());
        assert_eq!(room.member_ids(), vec![1]);
        assert_eq!(room.buffer_len(), 10);
    }

    #[test]
    fn offsets_follow_join_order() {
        let room = room_with(&[(1, 10), (2, 4), (3, 6)]);

        assert_eq!(room.offset_of(1), Some(0));
        assert_eq!(room.offset_of(2), Some(10));
        assert_eq!(room.offset_of(3), Some(14));
        assert_eq!(room.region_of(3), Some(14..20));
        assert_eq!(room.offset_of(4), None);
    }

    #[test]
    fn write_copies_into_region_and_marks_dirty() {
        let mut room = room_with(&[(1, 10), (2, 4)]);

        assert_eq!(room.write(2, &[9, 9, 9, 9]).unwrap(), 10);
        assert_eq!(room.dirty_start(), Some(10));
        assert_eq!(&room.buffer()[10..14], &[9, 9, 9, 9]);

        assert_eq!(room.write(1, &[1; 10]).unwrap(), 0);
        assert_eq!(room.dirty_start(), Some(0));
    }

    #[test]
    fn dirty_start_keeps_lowest_offset() {
        let mut room = room_with(&[(1, 2), (2, 2)]);

        room.write(1, &[1, 1]).unwrap();
        room.write(2, &[2, 2]).unwrap();

        assert_eq!(room.dirty_start(), Some(0));
    }

    #[test]
    fn take_dirty_drains_tail_and_cleans() {
        let mut room = room_with(&[(1, 2), (2, 3)]);
        room.write(2, &[7, 8, 9]).unwrap();

        let flushed = room.take_dirty().unwrap();
        assert_eq!(&flushed[..], &[7, 8, 9]);
        assert!(room.is_clean());
        assert!(room.take_dirty().is_none());
    }

    #[test]
    fn shorter_payload_leaves_stale_tail() {
        let mut room = room_with(&[(1, 4)]);

        room.write(1, &[1, 2, 3, 4]).unwrap();
        room.write(1, &[5, 6]).unwrap();

        assert_eq!(room.buffer(), &[5, 6, 3, 4]);
    }

    #[test]
    fn reserve_grows_and_zero_fills() {
        let mut room = room_with(&[(1, 2), (2, 2)]);
        room.write(2, &[3, 3]).unwrap();

        assert!(room.reserve(1, 5).unwrap());
        assert_eq!(room.buffer_len(), 7);
        assert!(room.buffer().iter().all(|b| *b == 0));
        assert!(room.is_clean());
        assert_eq!(room.offset_of(2), Some(5));
    }

    #[test]
    fn reserve_never_shrinks() {
        let mut room = room_with(&[(1, 8)]);

        assert!(!room.reserve(1, 3).unwrap());
        assert_eq!(room.reserved(1), Some(8));
    }

    #[test]
    fn leave_preserves_relative_order() {
        let mut room = room_with(&[(1, 1), (2, 2), (3, 3)]);

        assert!(room.leave(2).unwrap());
        assert_eq!(room.member_ids(), vec![1, 3]);
        assert_eq!(room.offset_of(3), Some(1));
        assert_eq!(room.buffer_len(), 4);
        assert!(!room.leave(2).unwrap());
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut room = room_with(&[(1, 2)]);

        let err = room.write(1, &[0; 3]).unwrap_err();
        assert_eq!(err, RoomError::PayloadTooLarge { id: 1, len: 3, reserved: 2 });
        assert!(room.is_clean());
    }

    #[test]
    fn non_member_write_is_rejected() {
        let mut room = Room::new();

        assert_eq!(room.write(5, &[]).unwrap_err(), RoomError::NotAMember(5));
        assert_eq!(room.reserve(5, 1).unwrap_err(), RoomError::NotAMember(5));
    }
}
