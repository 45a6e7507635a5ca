//! In-memory transport and backend.
//!
//! `MockTransport` serves scripted bulk IN chunks, records every control
//! call and can be told to fail any operation. `MockBackend` hands out
//! transports with the same exclusive-open rule as a real device: a path
//! stays busy until the transport returned by `open` is dropped.
//!
//! Both are cheap handles over shared state, so a test keeps a handle while
//! the session owns the opened transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use shared::{
    DeviceBackend, DeviceInfo, InterfaceDescriptor, Pipe, Transport, TransportError,
    TransportResult, INTERFACE_NUMBER,
};

/// Transport operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ReadBulk,
    WriteBulk,
    SetAlternateSetting,
    AbortPipe,
    FlushPipe,
    ResetPipe,
    QueryInterface,
    SetPipeTimeout,
    SetRawIo,
}

/// A recorded transport call; bulk reads are not recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    WriteBulk(Pipe, Vec<u8>),
    SetAlternateSetting(u8),
    AbortPipe(Pipe),
    FlushPipe(Pipe),
    ResetPipe(Pipe),
    QueryInterface,
    SetPipeTimeout(Pipe, Duration),
    SetRawIo(Pipe, bool),
}

#[derive(Default)]
struct State {
    incoming: VecDeque<TransportResult<Vec<u8>>>,
    calls: Vec<Call>,
    failures: HashMap<Op, TransportError>,
    short_write: Option<usize>,
    raw_io_supported: bool,
    alternate_setting: u8,
    abort_generation: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    data: Condvar,
}

// Releases an exclusive open when the transport is dropped
struct Lease {
    path: String,
    open: Arc<Mutex<HashSet<String>>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.open.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.path);
    }
}

/// Scripted bulk transport
#[derive(Default)]
pub struct MockTransport {
    shared: Arc<Shared>,
    _lease: Option<Lease>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another handle on the same state, without the exclusive-open lease
    pub fn handle(&self) -> MockTransport {
        MockTransport { shared: Arc::clone(&self.shared), _lease: None }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one bulk IN chunk
    pub fn push_chunk(&self, chunk: impl Into<Vec<u8>>) {
        self.lock().incoming.push_back(Ok(chunk.into()));
        self.shared.data.notify_all();
    }

    pub fn push_chunks<I>(&self, chunks: I)
    where
        I: IntoIterator,
        I::Item: Into<Vec<u8>>,
    {
        let mut state = self.lock();
        state.incoming.extend(chunks.into_iter().map(|c| Ok(c.into())));
        drop(state);
        self.shared.data.notify_all();
    }

    /// Queue a bulk IN failure, returned after the chunks queued before it
    pub fn push_error(&self, error: TransportError) {
        self.lock().incoming.push_back(Err(error));
        self.shared.data.notify_all();
    }

    /// Chunks and errors not yet read
    pub fn pending(&self) -> usize {
        self.lock().incoming.len()
    }

    /// Make every call of `op` fail with `error` until cleared
    pub fn fail(&self, op: Op, error: TransportError) {
        self.lock().failures.insert(op, error);
        self.shared.data.notify_all();
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Accept at most `limit` bytes per bulk write
    pub fn set_short_write(&self, limit: Option<usize>) {
        self.lock().short_write = limit;
    }

    pub fn set_raw_io_supported(&self, supported: bool) {
        self.lock().raw_io_supported = supported;
    }

    /// Alternate setting most recently selected
    pub fn alternate_setting(&self) -> u8 {
        self.lock().alternate_setting
    }

    /// Recorded calls, oldest first
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn control(&self, op: Op, call: Call) -> TransportResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(err) = state.failures.get(&op).copied() {
            return Err(err);
        }
        Ok(state)
    }
}

impl Transport for MockTransport {
    fn read_bulk(&self, pipe: Pipe, buf: &mut [u8], timeout: Duration) -> TransportResult<usize> {
        if pipe != Pipe::In {
            return Err(TransportError::NotSupported);
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        let generation = state.abort_generation;

        loop {
            if let Some(err) = state.failures.get(&Op::ReadBulk) {
                return Err(*err);
            }
            if state.abort_generation != generation {
                return Err(TransportError::Aborted);
            }
            if let Some(item) = state.incoming.pop_front() {
                let chunk = item?;
                let len = chunk.len().min(buf.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                return Ok(len);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout);
            }
            state = self
                .shared
                .data
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn write_bulk(&self, pipe: Pipe, data: &[u8], _timeout: Duration) -> TransportResult<usize> {
        let state = self.control(Op::WriteBulk, Call::WriteBulk(pipe, data.to_vec()))?;
        Ok(state.short_write.map_or(data.len(), |limit| limit.min(data.len())))
    }

    fn set_alternate_setting(&self, setting: u8) -> TransportResult<()> {
        let mut state =
            self.control(Op::SetAlternateSetting, Call::SetAlternateSetting(setting))?;
        state.alternate_setting = setting;
        Ok(())
    }

    fn abort_pipe(&self, pipe: Pipe) -> TransportResult<()> {
        let mut state = self.control(Op::AbortPipe, Call::AbortPipe(pipe))?;
        if pipe == Pipe::In {
            state.abort_generation += 1;
            drop(state);
            self.shared.data.notify_all();
        }
        Ok(())
    }

    fn flush_pipe(&self, pipe: Pipe) -> TransportResult<()> {
        self.control(Op::FlushPipe, Call::FlushPipe(pipe)).map(drop)
    }

    fn reset_pipe(&self, pipe: Pipe) -> TransportResult<()> {
        self.control(Op::ResetPipe, Call::ResetPipe(pipe)).map(drop)
    }

    fn query_interface(&self) -> TransportResult<InterfaceDescriptor> {
        let state = self.control(Op::QueryInterface, Call::QueryInterface)?;
        Ok(InterfaceDescriptor {
            interface_number: INTERFACE_NUMBER,
            alternate_setting: state.alternate_setting,
            class: 0xff,
            subclass: 0,
            protocol: 0,
            num_endpoints: 2,
        })
    }

    fn set_pipe_timeout(&self, pipe: Pipe, timeout: Duration) -> TransportResult<()> {
        self.control(Op::SetPipeTimeout, Call::SetPipeTimeout(pipe, timeout)).map(drop)
    }

    fn set_raw_io(&self, pipe: Pipe, enable: bool) -> TransportResult<()> {
        let state = self.control(Op::SetRawIo, Call::SetRawIo(pipe, enable))?;
        if state.raw_io_supported {
            Ok(())
        } else {
            Err(TransportError::NotSupported)
        }
    }
}

#[derive(Default)]
struct BackendState {
    devices: Vec<DeviceInfo>,
    transports: HashMap<String, MockTransport>,
    enumerate_error: Option<TransportError>,
}

/// Device list plus exclusive open
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
    open: Arc<Mutex<HashSet<String>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a device path; returns a handle on its transport
    ///
    /// The transport state outlives individual opens, so chunks can be
    /// queued before opening and the call journal read after close.
    pub fn add_device(&self, path: &str) -> MockTransport {
        let mut state = self.lock();
        state.devices.push(DeviceInfo {
            vendor_id: 0,
            product_id: 0,
            path: path.to_string(),
            description: String::new(),
        });
        state.transports.entry(path.to_string()).or_default().handle()
    }

    /// Handle on the transport of a registered path
    pub fn transport(&self, path: &str) -> Option<MockTransport> {
        self.lock().transports.get(path).map(MockTransport::handle)
    }

    /// Whether an opened transport for `path` is still alive
    pub fn is_open(&self, path: &str) -> bool {
        self.open.lock().unwrap_or_else(PoisonError::into_inner).contains(path)
    }

    pub fn fail_enumerate(&self, error: Option<TransportError>) {
        self.lock().enumerate_error = error;
    }
}

impl DeviceBackend for MockBackend {
    type Transport = MockTransport;

    fn enumerate(&self) -> TransportResult<Vec<DeviceInfo>> {
        let state = self.lock();
        match state.enumerate_error {
            Some(err) => Err(err),
            None => Ok(state.devices.clone()),
        }
    }

    fn open(&self, path: &str) -> TransportResult<MockTransport> {
        let state = self.lock();
        let transport = state.transports.get(path).ok_or(TransportError::NotFound)?;

        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !open.insert(path.to_string()) {
            return Err(TransportError::Busy);
        }

        Ok(MockTransport {
            shared: Arc::clone(&transport.shared),
            _lease: Some(Lease { path: path.to_string(), open: Arc::clone(&self.open) }),
        })
    }
}
