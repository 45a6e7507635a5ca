//! Frame counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of a session's counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Frames completed by the reassembler since open
    pub frames_captured: u64,
    /// Completed frames evicted before anyone read them
    pub frames_dropped: u64,
}

impl Stats {
    /// JSON form for host bridges
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Monotonic counters updated by the read loop
#[derive(Debug, Default)]
pub(crate) struct FrameCounters {
    captured: AtomicU64,
    dropped: AtomicU64,
}

impl FrameCounters {
    pub(crate) fn record_frame(&self, dropped: bool) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            frames_captured: self.captured.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
