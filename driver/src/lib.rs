//! # Useeplus SuperCamera Driver Core
//!
//! Host-side driver for the Useeplus / Geek szitman SuperCamera. It opens the
//! camera's vendor interface through a [`DeviceBackend`], sends the stream
//! init command and turns the bulk IN stream into JPEG frames handed to
//! blocking readers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Application                            │
//! │        read_frame() / frame_channel() / stats()              │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                     CameraSession (this lib)                 │
//! │                                                              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │  Read Loop  │──►│ Reassembler  │──►│ FrameRing+Condvar│   │
//! │  │  (thread)   │   │  (shared)    │   │                  │   │
//! │  └──────▲──────┘   └──────────────┘   └──────────────────┘   │
//! └─────────┼────────────────────────────────────────────────────┘
//!           │ bulk IN 0x81 / control
//! ┌─────────┴────────────────────────────────────────────────────┐
//! │                Transport (platform USB stack)                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use useeplus_driver::{mock::MockBackend, CameraSession, FrameSource};
//!
//! # fn main() -> useeplus_driver::Result<()> {
//! let backend = MockBackend::new();
//! let camera = CameraSession::open_first(&backend)?;
//! camera.start_streaming()?;
//! let frame = camera.read_frame_vec(Duration::from_secs(1))?;
//! println!("{} byte JPEG", frame.len());
//! camera.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! All output goes through the `log` facade. Applications without a logger
//! of their own can call [`init_logging`]; setting `USEEPLUS_DEBUG=1`
//! enables debug output for the driver.

use std::sync::Once;

use log::LevelFilter;

pub mod config;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod observer;
mod queue;
mod read_loop;
pub mod session;
pub mod stats;
pub mod stream;

pub use config::{CameraConfig, SettleTiming};
pub use discovery::{classify_path, enumerate, PathMatch};
pub use error::{CameraError, Result};
pub use observer::SessionObserver;
pub use session::{CameraSession, FrameSource, OpenOptions};
pub use stats::Stats;
pub use stream::frame_channel;

pub use shared::{DeviceBackend, DeviceInfo, Pipe, ReassemblerConfig, Transport, TransportError};

/// Environment variable that turns on debug logging
pub const DEBUG_ENV: &str = "USEEPLUS_DEBUG";

static INIT_LOGGER: Once = Once::new();

/// Install `env_logger` once
///
/// The default level is `info`, or `debug` for this crate and the shared
/// protocol crate when `USEEPLUS_DEBUG` is `1`, `true` or `yes`.
/// `RUST_LOG` overrides both.
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let level = if debug_requested(std::env::var(DEBUG_ENV).ok().as_deref()) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Info)
            .filter_module("useeplus_driver", level)
            .filter_module("useeplus_shared", level)
            .parse_default_env()
            .try_init();

        log::info!("Useeplus driver {} (protocol {})", env!("CARGO_PKG_VERSION"), shared::VERSION);
    });
}

fn debug_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}
