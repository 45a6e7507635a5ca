//! Helpers shared by the session and channel suites.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use useeplus_driver::mock::{MockBackend, MockTransport};
use useeplus_driver::{CameraConfig, FrameSource, SettleTiming};

pub const CAMERA_PATH: &str = r"\\?\usb#vid_2ce3&pid_3828&mi_01#6&2f3a1b&0&0001#{dee824ef}";

/// Defaults with every settle delay removed and short transport timeouts
pub fn fast_config() -> CameraConfig {
    CameraConfig {
        read_timeout_ms: 50,
        write_timeout_ms: 50,
        join_timeout_ms: 1000,
        timing: SettleTiming::none(),
        ..CameraConfig::default()
    }
}

pub fn camera_backend() -> (MockBackend, MockTransport) {
    let backend = MockBackend::new();
    let transport = backend.add_device(CAMERA_PATH);
    (backend, transport)
}

/// One record carrying `payload`
pub fn record(payload: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::new();
    shared::protocol::encode_record(payload, &mut chunk);
    chunk
}

/// SOI, `body` bytes of `fill`, EOI
pub fn jpeg(body: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.resize(2 + body, fill);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn wait_for_captured<S: FrameSource>(source: &S, count: u64) -> bool {
    wait_for(Duration::from_secs(2), || source.stats().frames_captured >= count)
}
