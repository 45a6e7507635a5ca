//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::{ReassemblerConfig, SLOT_CAPACITY};

use crate::error::{CameraError, Result};

/// Delays between transport steps during open/start/stop/close
///
/// The camera firmware needs time to settle after pipe resets and
/// alternate-setting changes; without these a reopen often fails until the
/// device is replugged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleTiming {
    /// After selecting alternate setting 0 on open
    pub open_ms: u64,
    /// Between alternate setting 0 and the inbound pipe reset on start
    pub alt_switch_ms: u64,
    /// After the ring is cleared on stop
    pub stop_ms: u64,
    /// After each abort/flush/reset round on close
    pub close_step_ms: u64,
    /// After returning to alternate setting 0 on close
    pub close_alt_ms: u64,
}

impl SettleTiming {
    /// No delays at all, for transports that need none
    pub const fn none() -> Self {
        Self {
            open_ms: 0,
            alt_switch_ms: 0,
            stop_ms: 0,
            close_step_ms: 0,
            close_alt_ms: 0,
        }
    }
}

impl Default for SettleTiming {
    fn default() -> Self {
        Self {
            open_ms: 100,
            alt_switch_ms: 10,
            stop_ms: 50,
            close_step_ms: 50,
            close_alt_ms: 100,
        }
    }
}

/// Configuration for a camera session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Completed frames queued before the oldest is dropped
    pub ring_depth: usize,
    /// Bulk IN timeout for each read loop iteration
    pub read_timeout_ms: u64,
    /// Timeout for the init command write
    pub write_timeout_ms: u64,
    /// How long stop waits for the read loop to exit
    pub join_timeout_ms: u64,
    /// Request raw I/O on the bulk IN pipe
    pub raw_io: bool,
    /// Frame acceptance rules
    pub reassembly: ReassemblerConfig,
    /// Settle delays
    pub timing: SettleTiming,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            ring_depth: 12,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            join_timeout_ms: 2000,
            raw_io: true,
            reassembly: ReassemblerConfig::default(),
            timing: SettleTiming::default(),
        }
    }
}

impl CameraConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CameraError::InvalidParameter(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.ring_depth == 0 {
            return Err(CameraError::InvalidParameter("ring_depth must be at least 1".into()));
        }
        if self.reassembly.min_frame_len < 4 {
            return Err(CameraError::InvalidParameter(
                "min_frame_len must cover SOI and EOI (4 bytes)".into(),
            ));
        }
        if self.reassembly.oversize_margin >= SLOT_CAPACITY {
            return Err(CameraError::InvalidParameter(format!(
                "oversize_margin must be below slot capacity ({SLOT_CAPACITY})"
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(CameraError::InvalidParameter("read_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
