//! # Shared Protocol Library
//!
//! This crate provides the core abstractions for the Useeplus SuperCamera driver:
//!
//! - **Wire Protocol**: Record magic, header length, JPEG markers and the init command
//! - **Frame Ring**: Fixed-capacity slots that decouple reassembly from frame readers
//! - **Reassembler**: Streaming state machine that recovers JPEG frames from bulk chunks
//! - **Transport Traits**: Abstraction over the bulk-pipe USB capability
//!
//! ## Architecture
//!
//! ```text
//! Bulk IN (0x81) ──► Reassembler ──► FrameRing ──► read_frame()
//!                        │
//!               strips AA BB 07 headers,
//!               splits on FF D8 .. FF D9
//! ```
//!
//! ## Frame Recovery Strategy
//!
//! The proprietary header carries no length spanning a video frame, so frames
//! are recovered from the embedded JPEG stream itself:
//! 1. Every chunk must start with the record magic, otherwise it is dropped
//! 2. A payload starting with SOI preempts any unterminated frame
//! 3. A frame completes at the first EOI past the minimum frame length
//! 4. Ambiguous or oversized accumulations are discarded, never stitched

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod buffer;
pub mod protocol;
pub mod reassembler;
pub mod traits;

// Re-export main types for convenience
pub use buffer::{BufferError, FrameRing, FrameSlot, SLOT_CAPACITY};
pub use protocol::{RecordError, INIT_COMMAND, RECORD_HEADER_LEN, RECORD_MAGIC};
pub use reassembler::{ChunkOutcome, Reassembler, ReassemblerConfig};
pub use traits::{
    DeviceBackend, DeviceInfo, InterfaceDescriptor, Pipe, Transport, TransportError, TransportResult,
};

/// Library version for diagnostics
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// USB vendor ID of the SuperCamera chipset
pub const VENDOR_ID: u16 = 0x2ce3;

/// USB product ID of the SuperCamera chipset
pub const PRODUCT_ID: u16 = 0x3828;

/// Interface carrying the vendor bulk endpoints
pub const INTERFACE_NUMBER: u8 = 1;
