//! Async adapter: frame source → tokio channel → consumer.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;

use crate::error::{CameraError, Result};
use crate::session::FrameSource;

// back-pressure: ring → channel → consumer
const DEPTH: usize = 4;

/// Poll interval used when `timeout` is zero, so a dropped receiver is noticed
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Forward frames from `source` into a bounded channel
///
/// A blocking thread reads with `timeout` per attempt and skips timeouts.
/// The thread ends when the receiver is dropped or after forwarding the
/// first other error. The source must already be streaming.
pub fn frame_channel<S>(source: Arc<S>, timeout: Duration) -> mpsc::Receiver<Result<Vec<u8>>>
where
    S: FrameSource + 'static,
{
    let (tx, rx) = mpsc::channel(DEPTH);
    let timeout = if timeout.is_zero() { IDLE_POLL } else { timeout };

    std::thread::spawn(move || {
        while !tx.is_closed() {
            match source.read_frame_vec(timeout) {
                Ok(frame) => {
                    if tx.blocking_send(Ok(frame)).is_err() {
                        break;
                    }
                }
                Err(CameraError::Timeout) => continue,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
        debug!("Frame channel closed");
    });

    rx
}
