//! Shared buffer pool
//!
//! Bulk payloads never travel inside a `Packet`; they live in one of a
//! fixed set of slots and the packet carries the slot index. Slots come in
//! two flavors, Fast and Slow, standing for the two memory regions the
//! boards place them in. Behavior is symmetric; the flavor only records
//! where a producer wants its data staged.
//!
//! Each slot sits behind its own `critical_section::Mutex`, and every
//! operation is a brief lock on that one slot. Frame bytes are staged
//! through the caller's buffer, so no lock is ever held across link I/O.
//!
//! Slot life cycle: `Empty* → (claim) → Full* → Empty*`. The claim flag
//! closes the window between handing out an empty slot and marking it
//! full, so two producers can never fill the same slot.

use core::cell::RefCell;

use critical_section::Mutex;

use super::packet::PacketType;

/// Slot payload capacity, sized for the largest frame on the wire
pub const SLOT_CAPACITY: usize = PacketType::SpectrometerFrame.wire_payload_len();

/// Fast-memory slots per board
pub const FAST_SLOT_COUNT: usize = 4;

/// Slow-memory slots per board
pub const SLOW_SLOT_COUNT: usize = 2;

/// Total slots per board
pub const SLOT_COUNT: usize = FAST_SLOT_COUNT + SLOW_SLOT_COUNT;

/// Index of a pool slot
///
/// Plain index into the board's arena; release is checked against the
/// slot's current state, so a stale id cannot corrupt a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(pub usize);

/// Memory region a slot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryClass {
    Fast,
    Slow,
}

/// Observable slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    EmptyFast,
    EmptySlow,
    FullFast,
    FullSlow,
}

impl SlotState {
    pub const fn empty_of(class: MemoryClass) -> SlotState {
        match class {
            MemoryClass::Fast => SlotState::EmptyFast,
            MemoryClass::Slow => SlotState::EmptySlow,
        }
    }

    pub const fn full_of(class: MemoryClass) -> SlotState {
        match class {
            MemoryClass::Fast => SlotState::FullFast,
            MemoryClass::Slow => SlotState::FullSlow,
        }
    }

    pub const fn class(self) -> MemoryClass {
        match self {
            SlotState::EmptyFast | SlotState::FullFast => MemoryClass::Fast,
            SlotState::EmptySlow | SlotState::FullSlow => MemoryClass::Slow,
        }
    }

    pub const fn is_empty(self) -> bool {
        matches!(self, SlotState::EmptyFast | SlotState::EmptySlow)
    }

    pub const fn is_full(self) -> bool {
        !self.is_empty()
    }
}

/// Pool operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolError {
    /// Slot index outside the arena
    InvalidSlot,
    /// Operation requires the caller to have claimed the slot first
    NotClaimed,
    /// Slot is not in the state the transition requires
    WrongState,
    /// More bytes than the slot can hold
    Oversize,
}

impl core::fmt::Display for PoolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PoolError::InvalidSlot => write!(f, "invalid slot index"),
            PoolError::NotClaimed => write!(f, "slot not claimed"),
            PoolError::WrongState => write!(f, "slot in wrong state"),
            PoolError::Oversize => write!(f, "data exceeds slot capacity"),
        }
    }
}

struct BufferSlot {
    state: SlotState,
    claimed: bool,
    len: usize,
    data: [u8; SLOT_CAPACITY],
}

impl BufferSlot {
    const fn new(class: MemoryClass) -> Self {
        Self {
            state: SlotState::empty_of(class),
            claimed: false,
            len: 0,
            data: [0; SLOT_CAPACITY],
        }
    }
}

type GuardedSlot = Mutex<RefCell<BufferSlot>>;

const fn fast_slot() -> GuardedSlot {
    Mutex::new(RefCell::new(BufferSlot::new(MemoryClass::Fast)))
}

const fn slow_slot() -> GuardedSlot {
    Mutex::new(RefCell::new(BufferSlot::new(MemoryClass::Slow)))
}

/// Fixed arena of payload slots, one pool per board
pub struct BufferPool {
    slots: [GuardedSlot; SLOT_COUNT],
}

impl BufferPool {
    /// All slots empty, Fast slots first
    pub const fn new() -> Self {
        Self {
            slots: [
                fast_slot(),
                fast_slot(),
                fast_slot(),
                fast_slot(),
                slow_slot(),
                slow_slot(),
            ],
        }
    }

    fn with_slot<R>(&self, slot: SlotId, f: impl FnOnce(&mut BufferSlot) -> R) -> Option<R> {
        let guarded = self.slots.get(slot.0)?;
        Some(critical_section::with(|cs| {
            f(&mut guarded.borrow_ref_mut(cs))
        }))
    }

    /// Claim an empty slot of the given class
    ///
    /// Returns `None` when the class is exhausted; callers treat that as
    /// transient backpressure and retry on a later pass.
    pub fn acquire_empty(&self, class: MemoryClass) -> Option<SlotId> {
        let wanted = SlotState::empty_of(class);
        for index in 0..SLOT_COUNT {
            let claimed = critical_section::with(|cs| {
                let mut slot = self.slots[index].borrow_ref_mut(cs);
                if slot.state == wanted && !slot.claimed {
                    slot.claimed = true;
                    true
                } else {
                    false
                }
            });
            if claimed {
                return Some(SlotId(index));
            }
        }
        None
    }

    /// Claim any empty slot, preferring Fast memory
    pub fn acquire_any(&self) -> Option<SlotId> {
        self.acquire_empty(MemoryClass::Fast)
            .or_else(|| self.acquire_empty(MemoryClass::Slow))
    }

    /// Copy `bytes` into a claimed empty slot
    pub fn write(&self, slot: SlotId, bytes: &[u8]) -> Result<(), PoolError> {
        self.with_slot(slot, |s| {
            if !s.state.is_empty() {
                return Err(PoolError::WrongState);
            }
            if !s.claimed {
                return Err(PoolError::NotClaimed);
            }
            if bytes.len() > SLOT_CAPACITY {
                return Err(PoolError::Oversize);
            }
            s.data[..bytes.len()].copy_from_slice(bytes);
            s.len = bytes.len();
            Ok(())
        })
        .ok_or(PoolError::InvalidSlot)?
    }

    /// Publish a claimed slot as full of the given class
    pub fn mark_full(&self, slot: SlotId, class: MemoryClass) -> Result<(), PoolError> {
        self.with_slot(slot, |s| {
            if s.state != SlotState::empty_of(class) {
                return Err(PoolError::WrongState);
            }
            if !s.claimed {
                return Err(PoolError::NotClaimed);
            }
            s.state = SlotState::full_of(class);
            s.claimed = false;
            Ok(())
        })
        .ok_or(PoolError::InvalidSlot)?
    }

    /// Consume a full slot's contents under a brief lock
    pub fn read<R>(&self, slot: SlotId, f: impl FnOnce(&[u8]) -> R) -> Result<R, PoolError> {
        self.with_slot(slot, |s| {
            if !s.state.is_full() {
                return Err(PoolError::WrongState);
            }
            let len = s.len;
            Ok(f(&s.data[..len]))
        })
        .ok_or(PoolError::InvalidSlot)?
    }

    /// Hand a full slot back to its empty state
    pub fn mark_empty(&self, slot: SlotId) -> Result<(), PoolError> {
        self.with_slot(slot, |s| {
            if !s.state.is_full() {
                return Err(PoolError::WrongState);
            }
            s.state = SlotState::empty_of(s.state.class());
            s.claimed = false;
            s.len = 0;
            Ok(())
        })
        .ok_or(PoolError::InvalidSlot)?
    }

    /// Return a slot to empty regardless of its current state
    ///
    /// The error-path leak guard: callers that abandon a transfer use this
    /// so no slot stays stuck full or claimed. A bad index is a no-op.
    pub fn force_release(&self, slot: SlotId) {
        let _ = self.with_slot(slot, |s| {
            s.state = SlotState::empty_of(s.state.class());
            s.claimed = false;
            s.len = 0;
        });
    }

    /// Memory class of a slot
    pub fn class_of(&self, slot: SlotId) -> Option<MemoryClass> {
        self.with_slot(slot, |s| s.state.class())
    }

    /// Current state of a slot
    pub fn state(&self, slot: SlotId) -> Option<SlotState> {
        self.with_slot(slot, |s| s.state)
    }

    /// Fill length of a slot
    pub fn len_of(&self, slot: SlotId) -> Option<usize> {
        self.with_slot(slot, |s| s.len)
    }

    /// Unclaimed empty slots of a class
    pub fn empty_count(&self, class: MemoryClass) -> usize {
        let wanted = SlotState::empty_of(class);
        (0..SLOT_COUNT)
            .filter(|&index| {
                critical_section::with(|cs| {
                    let slot = self.slots[index].borrow_ref(cs);
                    slot.state == wanted && !slot.claimed
                })
            })
            .count()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
