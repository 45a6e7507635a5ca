//! Optional per-session event hook.
//!
//! Injected at open time instead of relying on process-wide logging state.
//! Callbacks run on the read loop thread with no locks held; keep them short.

use shared::TransportError;

/// Receives session events as they happen
pub trait SessionObserver: Send + Sync {
    /// A frame of `len` bytes was queued
    fn on_frame(&self, _len: usize) {}

    /// An unread frame was evicted to make room
    fn on_frame_dropped(&self) {}

    /// A partial frame was discarded (overflow or missing EOI)
    fn on_discard(&self) {}

    /// The read loop exited because of a transport error
    fn on_stream_error(&self, _error: TransportError) {}
}
