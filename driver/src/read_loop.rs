//! Background bulk reader.
//!
//! One thread per streaming run. It owns a reassembler and feeds every bulk
//! chunk into the shared [`FrameQueue`](crate::queue::FrameQueue) until its
//! stop token is set or the transport reports a non-timeout error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use shared::{ChunkOutcome, Pipe, Reassembler, Transport, TransportError, SLOT_CAPACITY};

use crate::config::CameraConfig;
use crate::observer::SessionObserver;
use crate::queue::FrameQueue;

/// Handle to a running read loop
pub(crate) struct ReadLoop {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    // Disconnects when the thread finishes, panics included
    exited: mpsc::Receiver<()>,
}

struct LoopContext<T> {
    transport: Arc<T>,
    queue: Arc<FrameQueue>,
    reassembler: Reassembler,
    observer: Option<Arc<dyn SessionObserver>>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
    raw_io: bool,
}

impl ReadLoop {
    pub(crate) fn spawn<T: Transport + 'static>(
        transport: Arc<T>,
        queue: Arc<FrameQueue>,
        config: &CameraConfig,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (exit_tx, exited) = mpsc::channel::<()>();

        let ctx = LoopContext {
            transport,
            queue,
            reassembler: Reassembler::new(config.reassembly),
            observer,
            stop: Arc::clone(&stop),
            read_timeout: config.read_timeout(),
            raw_io: config.raw_io,
        };

        let handle = thread::Builder::new()
            .name("useeplus-read".into())
            .spawn(move || {
                let _exit = exit_tx;
                run(ctx);
            })?;

        Ok(Self { handle, stop, exited })
    }

    /// Ask the loop to exit after its current transfer
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait up to `timeout` for the thread to finish
    ///
    /// Hands the loop back if it is still running. Its stop token stays
    /// set, so it can no longer touch the queue, but it still holds the
    /// transport until its blocked read returns.
    pub(crate) fn join(self, timeout: Duration) -> Result<(), ReadLoop> {
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("Read loop did not exit within {:?}", timeout);
                Err(self)
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    error!("Read loop panicked");
                }
                Ok(())
            }
        }
    }
}

fn run<T: Transport>(ctx: LoopContext<T>) {
    if let Err(e) = ctx.transport.set_pipe_timeout(Pipe::In, ctx.read_timeout) {
        debug!("Pipe timeout not applied: {}", e);
    }
    if ctx.raw_io {
        if let Err(e) = ctx.transport.set_raw_io(Pipe::In, true) {
            debug!("Raw I/O unavailable: {}", e);
        }
    }

    info!("Read loop started");
    let mut chunk = vec![0u8; SLOT_CAPACITY];

    while !ctx.stop.load(Ordering::Acquire) {
        let len = match ctx.transport.read_bulk(Pipe::In, &mut chunk, ctx.read_timeout) {
            Ok(0) => continue,
            Ok(len) if len > chunk.len() => {
                warn!("Transport reported {} bytes for a {} byte buffer", len, chunk.len());
                chunk.len()
            }
            Ok(len) => len,
            Err(TransportError::Timeout) => continue,
            Err(e) => {
                if ctx.stop.load(Ordering::Acquire) {
                    debug!("Read loop interrupted: {}", e);
                } else {
                    error!("Bulk read failed, read loop exiting: {}", e);
                    if let Some(observer) = &ctx.observer {
                        observer.on_stream_error(e);
                    }
                }
                break;
            }
        };

        let Some(outcome) = ctx.queue.ingest(&ctx.reassembler, &chunk[..len], &ctx.stop) else {
            break;
        };
        report(&ctx, outcome);
    }

    info!("Read loop stopped");
}

fn report<T>(ctx: &LoopContext<T>, outcome: ChunkOutcome) {
    match outcome {
        ChunkOutcome::Frame { len, dropped } => {
            debug!("Frame complete: {} bytes", len);
            if dropped {
                warn!("Ring full, oldest frame dropped");
            }
            if let Some(observer) = &ctx.observer {
                if dropped {
                    observer.on_frame_dropped();
                }
                observer.on_frame(len);
            }
        }
        ChunkOutcome::Overflowed | ChunkOutcome::Oversized => {
            warn!("Partial frame discarded ({:?})", outcome);
            if let Some(observer) = &ctx.observer {
                observer.on_discard();
            }
        }
        ChunkOutcome::Skipped | ChunkOutcome::Accumulating => {}
    }
}
