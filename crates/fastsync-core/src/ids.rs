//! Connection id allocation.
//!
//! Ids are indices into a slot table of in-use flags. Slot 0 is reserved at
//! construction and never handed out, so clients can treat `0` as "no id".
//! Freed slots are reused lowest-first before the table grows, and the table
//! never shrinks.

/// Connection identifier assigned by the [`IdAllocator`].
pub type ConnId = u64;

/// Slot 0 is permanently in use.
pub const RESERVED_ID: ConnId = 0;

/// Lowest-free-slot id allocator.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    /// `slots[i]` is true while id `i` is held by a live connection
    slots: Vec<bool>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Create an allocator with only the reserved slot in use.
    pub fn new() -> Self {
        Self { slots: vec![true] }
    }

    /// Claim the lowest free id, growing the table when every slot is taken.
    ///
    /// Never returns [`RESERVED_ID`].
    pub fn allocate(&mut self) -> ConnId {
        if let Some(free) = self.slots.iter().position(|in_use| !in_use) {
            self.slots[free] = true;
            return free as ConnId;
        }

        self.slots.push(true);
        (self.slots.len() - 1) as ConnId
    }

    /// Return an id to the pool.
    ///
    /// Releasing the reserved slot, an unknown id, or an already free id is a
    /// no-op. Returns `true` if the slot was in use.
    pub fn release(&mut self, id: ConnId) -> bool {
        if id == RESERVED_ID {
            return false;
        }

        match usize::try_from(id).ok().and_then(|i| self.slots.get_mut(i)) {
            Some(slot) if *slot => {
                *slot = false;
                true
            },
            _ => false,
        }
    }

    /// Whether `id` is currently held.
    pub fn is_allocated(&self, id: ConnId) -> bool {
        id != RESERVED_ID
            && usize::try_from(id).ok().and_then(|i| self.slots.get(i)).copied().unwrap_or(false)
    }

    /// Number of ids currently held (excluding the reserved slot).
    pub fn allocated_count(&self) -> usize {
        self.slots.iter().filter(|in_use| **in_use).count() - 1
    }

    /// Size of the slot table, reserved slot included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
