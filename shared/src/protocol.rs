//! # Wire Protocol Definitions
//!
//! This module defines the byte-level format the camera uses on its bulk
//! endpoints. Nothing here allocates; all helpers work on borrowed slices.
//!
//! ## Record Format
//!
//! ```text
//! ┌──────────┬──────────────────────┬──────────────────────────────┐
//! │  Magic   │   Opaque header      │   JPEG elementary stream     │
//! │ AA BB 07 │      9 bytes         │       Variable size          │
//! └──────────┴──────────────────────┴──────────────────────────────┘
//! ```
//!
//! A bulk read returns exactly one record. The header carries no length
//! field that spans a full video frame, so a JPEG frame (SOI `FF D8` through
//! EOI `FF D9`) is usually split across many records.
//!
//! ## Control Channel
//!
//! Streaming starts once [`INIT_COMMAND`] is written to the bulk OUT endpoint
//! after the interface is switched to [`ALT_SETTING_STREAMING`].

use core::fmt;

/// Magic bytes that open every record
pub const RECORD_MAGIC: [u8; 3] = [0xAA, 0xBB, 0x07];

/// Total header length (magic plus 9 uninterpreted bytes)
pub const RECORD_HEADER_LEN: usize = 12;

/// Command that puts the camera into streaming mode
pub const INIT_COMMAND: [u8; 5] = [0xBB, 0xAA, 0x05, 0x00, 0x00];

/// JPEG Start-of-Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG End-of-Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Smallest SOI..EOI span accepted as a real frame
pub const MIN_FRAME_LEN: usize = 1000;

/// Headroom below slot capacity at which an unterminated frame is discarded
pub const OVERSIZE_MARGIN: usize = 4096;

/// Bulk IN endpoint address (video stream)
pub const EP_IN: u8 = 0x81;

/// Bulk OUT endpoint address (commands)
pub const EP_OUT: u8 = 0x01;

/// Idle alternate setting
pub const ALT_SETTING_IDLE: u8 = 0;

/// Alternate setting that enables the video stream
pub const ALT_SETTING_STREAMING: u8 = 1;

/// Errors when splitting a chunk into header and payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Chunk shorter than a full header
    TooShort,
    /// Chunk does not begin with [`RECORD_MAGIC`]
    InvalidMagic,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::TooShort => write!(f, "record shorter than {} byte header", RECORD_HEADER_LEN),
            RecordError::InvalidMagic => write!(f, "record does not start with AA BB 07"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RecordError {}

/// Split a raw bulk chunk into its header and payload
///
/// The magic is checked before the length so that a short chunk with a
/// foreign prefix reports [`RecordError::InvalidMagic`].
///
/// No attempt is made to find the magic anywhere but at offset 0; a chunk
/// whose leading bytes do not match is rejected as a whole.
pub fn split_record(chunk: &[u8]) -> Result<(&[u8], &[u8]), RecordError> {
    let magic_len = RECORD_MAGIC.len().min(chunk.len());
    if chunk[..magic_len] != RECORD_MAGIC[..magic_len] {
        return Err(RecordError::InvalidMagic);
    }
    if chunk.len() < RECORD_HEADER_LEN {
        return Err(RecordError::TooShort);
    }
    Ok(chunk.split_at(RECORD_HEADER_LEN))
}

/// Check whether `data` begins with a JPEG SOI marker
#[inline]
pub fn starts_with_soi(data: &[u8]) -> bool {
    data.starts_with(&SOI)
}

/// Find the end of the first EOI marker whose pair starts at or after `from`
///
/// Returns the index one past the `D9` byte, i.e. the length of the span
/// `data[..end]` that the marker terminates.
pub fn find_eoi(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(EOI.len())
        .position(|pair| pair == EOI)
        .map(|pos| from + pos + EOI.len())
}

/// Build a record around `payload` with a zeroed opaque header
///
/// Useful for hosts that replay captured streams and for tests.
pub fn encode_record(payload: &[u8], out: &mut alloc::vec::Vec<u8>) {
    out.clear();
    out.reserve(RECORD_HEADER_LEN + payload.len());
    out.extend_from_slice(&RECORD_MAGIC);
    out.resize(RECORD_HEADER_LEN, 0);
    out.extend_from_slice(payload);
}
