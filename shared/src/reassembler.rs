//! # JPEG Frame Reassembler
//!
//! Turns the camera's chunked bulk stream into complete JPEG frames inside a
//! [`FrameRing`]. The reassembler holds only configuration; all streaming
//! state lives in the ring's write slot, so clearing the ring fully resets
//! reassembly.
//!
//! ## Per-Chunk Rules
//!
//! ```text
//! chunk ── magic? ──no──► Skipped
//!            │
//!            ▼ strip 12-byte header
//!   payload starts with SOI ──► drop unterminated slot content
//!            │
//!   fits in slot? ──no──► Overflowed (re-seed only if payload has SOI)
//!            │
//!   EOI past min length and slot starts with SOI?
//!            │ yes                                │ no
//!            ▼                                    ▼
//!   Frame: freeze span, advance ring,        Accumulating
//!   keep leftover only if it starts with SOI
//!            │
//!   write slot > capacity - margin ──► Oversized (slot emptied)
//! ```
//!
//! A dropped frame is preferred to a stitched one: whenever the stream is
//! ambiguous the partial data is thrown away.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::buffer::{FrameRing, SLOT_CAPACITY};
use crate::protocol::{self, MIN_FRAME_LEN, OVERSIZE_MARGIN};

/// Tunables for frame acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblerConfig {
    /// Smallest SOI..EOI span accepted as a frame
    pub min_frame_len: usize,
    /// Headroom below slot capacity that triggers the oversized discard
    pub oversize_margin: usize,
}

impl ReassemblerConfig {
    /// Length above which an unterminated write slot is discarded
    pub fn oversize_limit(&self) -> usize {
        SLOT_CAPACITY.saturating_sub(self.oversize_margin)
    }
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            min_frame_len: MIN_FRAME_LEN,
            oversize_margin: OVERSIZE_MARGIN,
        }
    }
}

/// Result of feeding one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChunkOutcome {
    /// Chunk had no record magic or no payload
    Skipped,
    /// Payload appended, no frame completed yet
    Accumulating,
    /// Payload did not fit; the unterminated frame was discarded
    Overflowed,
    /// Write slot grew past the oversize limit without an EOI and was emptied
    Oversized,
    /// A frame of `len` bytes completed; `dropped` if an unread frame was evicted
    Frame { len: usize, dropped: bool },
}

/// Streaming SOI/EOI frame reassembler
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    config: ReassemblerConfig,
}

impl Reassembler {
    /// Create a reassembler with the given acceptance rules
    pub fn new(config: ReassemblerConfig) -> Self {
        Self { config }
    }

    /// Acceptance rules in use
    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }

    /// Feed one raw bulk chunk into `ring`
    pub fn push_chunk(&self, ring: &mut FrameRing, chunk: &[u8]) -> ChunkOutcome {
        let payload = match protocol::split_record(chunk) {
            Ok((_, payload)) if !payload.is_empty() => payload,
            _ => return ChunkOutcome::Skipped,
        };

        let new_frame = protocol::starts_with_soi(payload);
        let slot = ring.write_slot_mut();

        // A fresh SOI always wins over an unterminated frame
        if new_frame && !slot.is_empty() {
            slot.reset();
        }

        if slot.append(payload).is_err() {
            slot.reset();
            if new_frame {
                // Fails again only for a payload larger than a whole slot
                let _ = slot.append(payload);
            }
            return ChunkOutcome::Overflowed;
        }

        let mut outcome = ChunkOutcome::Accumulating;
        if let Some(end) = self.find_frame_end(ring) {
            let slot = ring.write_slot();
            let leftover: Option<Vec<u8>> = slot
                .as_slice()
                .get(end..)
                .filter(|rest| protocol::starts_with_soi(rest))
                .map(|rest| rest.to_vec());

            let dropped = ring.complete_write(end);
            if let Some(rest) = leftover {
                let _ = ring.write_slot_mut().append(&rest);
            }
            outcome = ChunkOutcome::Frame { len: end, dropped };
        }

        let slot = ring.write_slot_mut();
        if slot.len() > self.config.oversize_limit() {
            slot.reset();
            if outcome == ChunkOutcome::Accumulating {
                outcome = ChunkOutcome::Oversized;
            }
        }

        outcome
    }

    /// Locate the end of a valid frame in the write slot
    ///
    /// Resumes from the previous scan position (one byte back, so a marker
    /// split across appends is still seen). An EOI that closes a span shorter
    /// than the minimum is skipped and the search continues.
    fn find_frame_end(&self, ring: &mut FrameRing) -> Option<usize> {
        let slot = ring.write_slot_mut();
        let data = slot.as_slice();
        if !protocol::starts_with_soi(data) {
            slot.mark_scanned();
            return None;
        }

        let mut from = slot.scanned().saturating_sub(1);
        while let Some(end) = protocol::find_eoi(data, from) {
            if end >= self.config.min_frame_len {
                return Some(end);
            }
            from = end - 1;
        }
        slot.mark_scanned();
        None
    }
}
