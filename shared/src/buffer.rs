//! # Frame Slot Ring
//!
//! This module provides the fixed set of reusable frame buffers that sit
//! between the reassembler (producer) and frame readers (consumer).
//!
//! ## Design
//!
//! 1. **Bounds-Checked Slots**: Each slot is a `heapless::Vec` of
//!    [`SLOT_CAPACITY`] bytes, so capacity and length travel together and an
//!    append either fits completely or is rejected.
//!
//! 2. **Lazy Allocation**: Slot storage is boxed on first write and released
//!    with [`FrameRing::release`], so an idle session costs almost nothing.
//!
//! 3. **Drop-Oldest Overflow**: The ring holds `depth` completed frames plus
//!    the slot being written. Completing a frame when all `depth` are unread
//!    evicts the oldest one; the write slot is never evicted.
//!
//! The ring itself is not synchronized. The driver wraps it in one lock per
//! session.
//!
//! ## Layout
//!
//! ```text
//!   read                          write
//!    ▼                              ▼
//! ┌───────┬───────┬───────┬─────┬─────────┬───────┐
//! │ ready │ ready │ ready │ ... │ filling │ empty │   (depth + 1 slots)
//! └───────┴───────┴───────┴─────┴─────────┴───────┘
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Capacity of a single frame slot: 64KB
/// - Large enough for the camera's largest JPEG at its fixed resolution
/// - Equal to the bulk read size so one chunk always fits an empty slot
pub const SLOT_CAPACITY: usize = 64 * 1024;

type SlotStorage = heapless::Vec<u8, SLOT_CAPACITY>;

/// Errors specific to slot operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferError {
    /// Appending would exceed [`SLOT_CAPACITY`]
    Overflow,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Overflow => write!(f, "frame slot capacity ({} bytes) exceeded", SLOT_CAPACITY),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BufferError {}

/// One reusable frame buffer
#[derive(Default)]
pub struct FrameSlot {
    data: Option<Box<SlotStorage>>,
    ready: bool,
    /// Bytes already searched for EOI since the last reset
    scanned: usize,
}

impl FrameSlot {
    /// Create an empty slot with no storage allocated
    pub const fn new() -> Self {
        Self {
            data: None,
            ready: false,
            scanned: 0,
        }
    }

    /// Current number of bytes held
    #[inline]
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Check if the slot holds no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the slot holds a completed, unread frame
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether storage has been allocated
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.data.is_some()
    }

    /// The bytes currently held
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// Append `bytes` as a single checked operation
    ///
    /// On error nothing is written.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if self.len() + bytes.len() > SLOT_CAPACITY {
            return Err(BufferError::Overflow);
        }
        self.storage_mut()
            .extend_from_slice(bytes)
            .map_err(|_| BufferError::Overflow)
    }

    /// Drop the content and readiness but keep the storage
    pub fn reset(&mut self) {
        if let Some(data) = self.data.as_mut() {
            data.clear();
        }
        self.ready = false;
        self.scanned = 0;
    }

    /// Free the storage
    pub fn release(&mut self) {
        self.data = None;
        self.ready = false;
        self.scanned = 0;
    }

    pub(crate) fn scanned(&self) -> usize {
        self.scanned
    }

    pub(crate) fn mark_scanned(&mut self) {
        self.scanned = self.len();
    }

    /// Cut the content to `len` bytes and mark it as a completed frame
    pub(crate) fn freeze(&mut self, len: usize) {
        if let Some(data) = self.data.as_mut() {
            data.truncate(len);
        }
        self.ready = true;
    }

    fn storage_mut(&mut self) -> &mut SlotStorage {
        self.data.get_or_insert_with(|| Box::new(SlotStorage::new()))
    }
}

impl fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSlot")
            .field("len", &self.len())
            .field("ready", &self.ready)
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

/// Ring of frame slots with drop-oldest overflow
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    write: usize,
    read: usize,
}

impl FrameRing {
    /// Create a ring that can queue `depth` completed frames
    ///
    /// One extra slot is kept as the write slot. A `depth` of zero is
    /// treated as one.
    pub fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(depth.max(1) + 1);
        slots.resize_with(depth.max(1) + 1, FrameSlot::new);
        Self {
            slots,
            write: 0,
            read: 0,
        }
    }

    /// Number of completed frames the ring can queue
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len() - 1
    }

    /// Index of the slot being written
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Index of the next slot to be read
    #[inline]
    pub fn read_index(&self) -> usize {
        self.read
    }

    /// The slot currently being written
    pub fn write_slot(&self) -> &FrameSlot {
        &self.slots[self.write]
    }

    /// Mutable access to the slot currently being written
    pub fn write_slot_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.write]
    }

    /// Number of completed frames waiting to be read
    pub fn ready_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_ready()).count()
    }

    /// Peek at the next completed frame without consuming it
    pub fn peek_ready(&self) -> Option<&[u8]> {
        let slot = &self.slots[self.read];
        slot.is_ready().then(|| slot.as_slice())
    }

    /// Consume the frame at the read cursor
    ///
    /// Returns `false` when no frame was ready.
    pub fn consume(&mut self) -> bool {
        let slot = &mut self.slots[self.read];
        if !slot.is_ready() {
            return false;
        }
        slot.reset();
        self.read = self.next(self.read);
        true
    }

    /// Copy the next completed frame into `buf` and consume it
    ///
    /// Returns `Ok(None)` when no frame is ready and `Err(needed)` when
    /// `buf` is too small, in which case the frame stays queued.
    pub fn pop_into(&mut self, buf: &mut [u8]) -> Result<Option<usize>, usize> {
        let Some(frame) = self.peek_ready() else {
            return Ok(None);
        };
        let len = frame.len();
        if len > buf.len() {
            return Err(len);
        }
        buf[..len].copy_from_slice(frame);
        self.consume();
        Ok(Some(len))
    }

    /// Freeze the write slot as a `len`-byte frame and move to the next slot
    ///
    /// Returns `true` if an unread frame had to be evicted. The new write
    /// slot is always reset.
    pub fn complete_write(&mut self, len: usize) -> bool {
        self.slots[self.write].freeze(len);

        let next = self.next(self.write);
        let mut dropped = false;
        if next == self.read && self.slots[self.read].is_ready() {
            dropped = true;
            self.read = self.next(self.read);
        }
        self.write = next;
        self.slots[self.write].reset();
        dropped
    }

    /// Drop every frame and rewind both cursors, keeping storage
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
        self.write = 0;
        self.read = 0;
    }

    /// Drop every frame and free all slot storage
    pub fn release(&mut self) {
        for slot in &mut self.slots {
            slot.release();
        }
        self.write = 0;
        self.read = 0;
    }

    /// Number of slots with storage allocated
    pub fn allocated_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_allocated()).count()
    }

    #[inline]
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new(12)
    }
}
