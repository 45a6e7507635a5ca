//! Frame ring shared between the read loop and frame readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use shared::{ChunkOutcome, FrameRing, Reassembler};

use crate::error::{CameraError, Result};
use crate::stats::{FrameCounters, Stats};

/// One lock around the ring, plus the readiness signal
pub(crate) struct FrameQueue {
    ring: Mutex<FrameRing>,
    ready: Condvar,
    streaming: AtomicBool,
    counters: FrameCounters,
}

impl FrameQueue {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            ring: Mutex::new(FrameRing::new(depth)),
            ready: Condvar::new(),
            streaming: AtomicBool::new(false),
            counters: FrameCounters::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub(crate) fn set_streaming(&self, streaming: bool) -> bool {
        self.streaming.swap(streaming, Ordering::AcqRel)
    }

    pub(crate) fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    /// Run one chunk through the reassembler
    ///
    /// Returns `None` without touching the ring once `stop` is set, so a
    /// read loop that outlives its session's stop can never queue a frame.
    pub(crate) fn ingest(
        &self,
        reassembler: &Reassembler,
        chunk: &[u8],
        stop: &AtomicBool,
    ) -> Option<ChunkOutcome> {
        let mut ring = self.lock();
        if stop.load(Ordering::Acquire) {
            return None;
        }
        let outcome = reassembler.push_chunk(&mut ring, chunk);
        if let ChunkOutcome::Frame { dropped, .. } = outcome {
            self.counters.record_frame(dropped);
            self.ready.notify_all();
        }
        Some(outcome)
    }

    /// Block until a frame is copied into `buf`
    ///
    /// A zero `timeout`, or one too large to form a deadline, waits without
    /// bound.
    pub(crate) fn pop_blocking(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = if timeout.is_zero() { None } else { Instant::now().checked_add(timeout) };
        let mut ring = self.lock();
        loop {
            if !self.is_streaming() {
                return Err(CameraError::NotStreaming);
            }
            match ring.pop_into(buf) {
                Ok(Some(len)) => return Ok(len),
                Err(needed) => {
                    return Err(CameraError::BufferTooSmall { needed, available: buf.len() })
                }
                Ok(None) => {}
            }

            ring = match deadline {
                None => self.ready.wait(ring).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CameraError::Timeout);
                    }
                    self.ready
                        .wait_timeout(ring, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Empty every slot, rewind the cursors and wake blocked readers
    pub(crate) fn clear(&self) {
        self.lock().clear();
        self.ready.notify_all();
    }

    /// Free all slot storage
    pub(crate) fn release(&self) {
        self.lock().release();
        self.ready.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn allocated_slots(&self) -> usize {
        self.lock().allocated_slots()
    }
}
