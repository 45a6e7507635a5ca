//! # Camera Session
//!
//! A session owns one opened transport, the frame queue and at most one
//! read loop. It is the only place that sequences transport control
//! requests, so every open/start/stop/close leaves the device in a state
//! from which it can be reopened without replugging it.
//!
//! ## Lifecycle
//!
//! ```text
//!   open ──► Open ──start_streaming──► Streaming
//!             ▲                            │
//!             └──────stop_streaming────────┘
//!   close (or drop) from either state stops first, then resets the pipes
//! ```
//!
//! Lifecycle calls are serialized by an internal lock. Frame reads only take
//! the queue lock and may run on any number of threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use shared::protocol::{ALT_SETTING_IDLE, ALT_SETTING_STREAMING};
use shared::{DeviceBackend, Pipe, Transport, TransportResult, INIT_COMMAND, SLOT_CAPACITY};

use crate::config::CameraConfig;
use crate::discovery;
use crate::error::{CameraError, Result};
use crate::observer::SessionObserver;
use crate::queue::FrameQueue;
use crate::read_loop::ReadLoop;
use crate::stats::Stats;

/// Consumer side of a camera session
///
/// Implemented by [`CameraSession`]; adapters such as
/// [`frame_channel`](crate::stream::frame_channel) only need this.
pub trait FrameSource: Send + Sync {
    /// Start the device stream; a no-op when already streaming
    fn start_streaming(&self) -> Result<()>;

    /// Stop the device stream; a no-op when not streaming
    fn stop_streaming(&self);

    /// Whether streaming was started and not stopped
    ///
    /// Stays true if the read loop died on a transport error; reads then
    /// time out until the caller stops and restarts.
    fn is_streaming(&self) -> bool;

    /// Copy the oldest ready frame into `buf`, waiting up to `timeout`
    ///
    /// A zero timeout waits without bound. Returns the frame length.
    fn read_frame(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Like [`read_frame`](Self::read_frame) into a freshly allocated buffer
    fn read_frame_vec(&self, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SLOT_CAPACITY];
        let len = self.read_frame(&mut buf, timeout)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Frame counters since open
    fn stats(&self) -> Stats;

    /// Most recent failure of any session operation
    fn last_error(&self) -> Option<CameraError>;
}

/// Options used to open a [`CameraSession`]
#[derive(Clone, Default)]
pub struct OpenOptions {
    config: CameraConfig,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an event observer to the session
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Open the camera at `path` exclusively
    pub fn open_path<B: DeviceBackend>(
        &self,
        backend: &B,
        path: &str,
    ) -> Result<CameraSession<B::Transport>> {
        self.config.validate()?;
        let transport = backend.open(path).map_err(|source| {
            warn!("Failed to open {}: {}", path, source);
            CameraError::OpenFailed { path: path.to_string(), source }
        })?;
        self.open_transport(transport, path)
    }

    /// Open the first camera the backend reports
    pub fn open_first<B: DeviceBackend>(&self, backend: &B) -> Result<CameraSession<B::Transport>> {
        let devices = discovery::enumerate(backend)?;
        let device = devices.first().ok_or(CameraError::DeviceNotFound)?;
        self.open_path(backend, &device.path)
    }

    /// Build a session on a transport that is already open
    pub fn open_transport<T: Transport + 'static>(
        &self,
        transport: T,
        path: &str,
    ) -> Result<CameraSession<T>> {
        self.config.validate()?;
        info!("Opening camera at {}", path);

        let session = CameraSession {
            path: path.to_string(),
            transport: Arc::new(transport),
            queue: Arc::new(FrameQueue::new(self.config.ring_depth)),
            config: self.config.clone(),
            observer: self.observer.clone(),
            reader: Mutex::new(None),
            detached: Mutex::new(Vec::new()),
            last_error: Mutex::new(None),
            closed: false,
        };
        session.clear_stale_state();
        info!("Camera opened");
        Ok(session)
    }
}

/// An open camera
pub struct CameraSession<T: Transport + 'static> {
    path: String,
    transport: Arc<T>,
    queue: Arc<FrameQueue>,
    config: CameraConfig,
    observer: Option<Arc<dyn SessionObserver>>,
    // Lifecycle lock; holds the read loop while streaming
    reader: Mutex<Option<ReadLoop>>,
    // Stopped loops still blocked in a transfer; they hold the transport
    detached: Mutex<Vec<ReadLoop>>,
    last_error: Mutex<Option<CameraError>>,
    closed: bool,
}

impl<T: Transport + 'static> CameraSession<T> {
    /// Open the camera at `path` with default options
    pub fn open_path<B>(backend: &B, path: &str) -> Result<Self>
    where
        B: DeviceBackend<Transport = T>,
    {
        OpenOptions::new().open_path(backend, path)
    }

    /// Open the first camera found with default options
    pub fn open_first<B>(backend: &B) -> Result<Self>
    where
        B: DeviceBackend<Transport = T>,
    {
        OpenOptions::new().open_first(backend)
    }

    /// Path this session was opened on
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Stop streaming, reset the device and release it
    pub fn close(mut self) {
        self.shutdown();
    }

    fn lock_reader(&self) -> MutexGuard<'_, Option<ReadLoop>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record<R>(&self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
        }
        result
    }

    fn clear_stale_state(&self) {
        let t = &*self.transport;
        best_effort("abort IN", t.abort_pipe(Pipe::In));
        best_effort("abort OUT", t.abort_pipe(Pipe::Out));
        best_effort("flush IN", t.flush_pipe(Pipe::In));
        best_effort("flush OUT", t.flush_pipe(Pipe::Out));
        best_effort("reset IN", t.reset_pipe(Pipe::In));
        best_effort("reset OUT", t.reset_pipe(Pipe::Out));
        best_effort("alternate setting 0", t.set_alternate_setting(ALT_SETTING_IDLE));
        settle(self.config.timing.open_ms);

        match t.query_interface() {
            Ok(desc) => debug!(
                "Interface {} alt {}: class 0x{:02x}, {} endpoints",
                desc.interface_number, desc.alternate_setting, desc.class, desc.num_endpoints
            ),
            Err(e) => warn!("Interface query failed: {}", e),
        }
    }

    fn start_locked(&self, reader: &mut Option<ReadLoop>) -> Result<()> {
        if self.queue.is_streaming() {
            debug!("Already streaming");
            return Ok(());
        }
        info!("Starting stream");

        let t = &*self.transport;
        best_effort("alternate setting 0", t.set_alternate_setting(ALT_SETTING_IDLE));
        settle(self.config.timing.alt_switch_ms);
        best_effort("reset IN", t.reset_pipe(Pipe::In));
        best_effort("flush IN", t.flush_pipe(Pipe::In));

        t.set_alternate_setting(ALT_SETTING_STREAMING)
            .map_err(|e| CameraError::init("alternate setting 1", e))?;

        let sent = t
            .write_bulk(Pipe::Out, &INIT_COMMAND, self.config.write_timeout())
            .map_err(|e| CameraError::transfer("init command", e))?;
        if sent != INIT_COMMAND.len() {
            return Err(CameraError::UsbTransferFailed(format!(
                "init command: short write ({} of {} bytes)",
                sent,
                INIT_COMMAND.len()
            )));
        }
        debug!("Init command sent");

        self.queue.clear();
        self.queue.set_streaming(true);
        let spawned = ReadLoop::spawn(
            Arc::clone(&self.transport),
            Arc::clone(&self.queue),
            &self.config,
            self.observer.clone(),
        );
        match spawned {
            Ok(handle) => {
                *reader = Some(handle);
                info!("Streaming started");
                Ok(())
            }
            Err(e) => {
                self.queue.set_streaming(false);
                Err(CameraError::init("read loop spawn", e))
            }
        }
    }

    fn stop_locked(&self, reader: &mut Option<ReadLoop>) {
        let was_streaming = self.queue.set_streaming(false);
        let Some(handle) = reader.take() else {
            if was_streaming {
                self.queue.clear();
            }
            return;
        };
        info!("Stopping stream");

        let t = &*self.transport;
        handle.request_stop();
        best_effort("abort IN", t.abort_pipe(Pipe::In));
        if let Err(stray) = handle.join(self.config.join_timeout()) {
            warn!("Detaching read loop until its transfer returns");
            self.detached.lock().unwrap_or_else(PoisonError::into_inner).push(stray);
        }

        best_effort("flush IN", t.flush_pipe(Pipe::In));
        best_effort("reset IN", t.reset_pipe(Pipe::In));
        self.queue.clear();
        settle(self.config.timing.stop_ms);
        info!("Streaming stopped");
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        {
            let mut reader = self.lock_reader();
            self.stop_locked(&mut reader);
        }

        info!("Closing camera at {}", self.path);
        let t = &*self.transport;
        let timing = self.config.timing;

        best_effort("abort IN", t.abort_pipe(Pipe::In));
        best_effort("abort OUT", t.abort_pipe(Pipe::Out));
        settle(timing.close_step_ms);
        best_effort("flush IN", t.flush_pipe(Pipe::In));
        best_effort("flush OUT", t.flush_pipe(Pipe::Out));
        settle(timing.close_step_ms);
        best_effort("reset IN", t.reset_pipe(Pipe::In));
        best_effort("reset OUT", t.reset_pipe(Pipe::Out));
        settle(timing.close_step_ms);
        best_effort("alternate setting 0", t.set_alternate_setting(ALT_SETTING_IDLE));
        settle(timing.close_alt_ms);

        // A blocked read returns within the read timeout at the latest
        let grace = self.config.read_timeout() + self.config.join_timeout();
        let strays = std::mem::take(&mut *self.detached.lock().unwrap_or_else(PoisonError::into_inner));
        for stray in strays {
            if stray.join(grace).is_err() {
                warn!("Read loop still running after {:?}; transport stays referenced", grace);
            }
        }

        self.queue.release();
        info!("Camera closed");
    }
}

impl<T: Transport + 'static> FrameSource for CameraSession<T> {
    fn start_streaming(&self) -> Result<()> {
        let mut reader = self.lock_reader();
        let result = self.start_locked(&mut reader);
        self.record(result)
    }

    fn stop_streaming(&self) {
        let mut reader = self.lock_reader();
        self.stop_locked(&mut reader);
    }

    fn is_streaming(&self) -> bool {
        self.queue.is_streaming()
    }

    fn read_frame(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return self.record(Err(CameraError::InvalidParameter("empty frame buffer".into())));
        }
        let result = self.queue.pop_blocking(buf, timeout);
        self.record(result)
    }

    fn stats(&self) -> Stats {
        self.queue.stats()
    }

    fn last_error(&self) -> Option<CameraError> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<T: Transport + 'static> Drop for CameraSession<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn best_effort(step: &str, result: TransportResult<()>) {
    match result {
        Ok(()) => debug!("{}: ok", step),
        Err(e) => warn!("{} failed: {}", step, e),
    }
}

fn settle(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
