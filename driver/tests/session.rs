//! Session lifecycle and frame delivery against the mock transport.
//!
//! Run: `cargo test -p useeplus-driver --test session`

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::*;
use useeplus_driver::mock::{Call, MockBackend, Op};
use useeplus_driver::{
    CameraConfig, CameraError, CameraSession, FrameSource, OpenOptions, Pipe, SessionObserver,
    TransportError,
};

const INIT: [u8; 5] = [0xBB, 0xAA, 0x05, 0x00, 0x00];

fn open(backend: &MockBackend) -> CameraSession<useeplus_driver::mock::MockTransport> {
    OpenOptions::new().config(fast_config()).open_path(backend, CAMERA_PATH).unwrap()
}

#[derive(Default)]
struct Recorder {
    frames: AtomicUsize,
    drops: AtomicUsize,
    discards: AtomicUsize,
    errors: Mutex<Vec<TransportError>>,
}

impl SessionObserver for Recorder {
    fn on_frame(&self, _len: usize) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    fn on_frame_dropped(&self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }

    fn on_discard(&self) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stream_error(&self, error: TransportError) {
        self.errors.lock().unwrap().push(error);
    }
}

// ── Open / close ─────────────────────────────────────────────────────

#[test]
fn test_open_clears_stale_state() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);

    assert_eq!(
        transport.calls(),
        [
            Call::AbortPipe(Pipe::In),
            Call::AbortPipe(Pipe::Out),
            Call::FlushPipe(Pipe::In),
            Call::FlushPipe(Pipe::Out),
            Call::ResetPipe(Pipe::In),
            Call::ResetPipe(Pipe::Out),
            Call::SetAlternateSetting(0),
            Call::QueryInterface,
        ]
    );
    assert!(!camera.is_streaming());
    assert_eq!(camera.path(), CAMERA_PATH);
}

#[test]
fn test_open_tolerates_cleanup_failures() {
    let (backend, transport) = camera_backend();
    transport.fail(Op::AbortPipe, TransportError::Os(22));
    transport.fail(Op::QueryInterface, TransportError::NotSupported);

    let camera = open(&backend);
    assert_eq!(transport.calls().len(), 8);
    assert_eq!(camera.last_error(), None);
}

#[test]
fn test_open_errors() {
    let backend = MockBackend::new();
    assert!(matches!(
        CameraSession::open_first(&backend),
        Err(CameraError::DeviceNotFound)
    ));
    assert!(matches!(
        CameraSession::open_path(&backend, CAMERA_PATH),
        Err(CameraError::OpenFailed { source: TransportError::NotFound, .. })
    ));

    let (backend, _transport) = camera_backend();
    let _camera = open(&backend);
    let err = OpenOptions::new().config(fast_config()).open_path(&backend, CAMERA_PATH).err();
    assert!(matches!(
        err,
        Some(CameraError::OpenFailed { source: TransportError::Busy, .. })
    ));
    assert_eq!(err.map(|e| e.code()), Some(-2));
}

#[test]
fn test_open_rejects_invalid_config() {
    let (backend, _transport) = camera_backend();
    let config = CameraConfig { ring_depth: 0, ..fast_config() };
    let result = OpenOptions::new().config(config).open_path(&backend, CAMERA_PATH);
    assert!(matches!(result, Err(CameraError::InvalidParameter(_))));
    assert!(!backend.is_open(CAMERA_PATH));
}

#[test]
fn test_open_first_picks_vendor_interface() {
    let backend = MockBackend::new();
    backend.add_device(r"\\?\usb#vid_2ce3&pid_3828#generic");
    backend.add_device(CAMERA_PATH);

    let camera = OpenOptions::new().config(fast_config()).open_first(&backend).unwrap();
    assert_eq!(camera.path(), CAMERA_PATH);
}

#[test]
fn test_close_runs_every_cleanup_step() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);
    transport.clear_calls();
    transport.fail(Op::AbortPipe, TransportError::Stall);
    transport.fail(Op::FlushPipe, TransportError::Disconnected);
    transport.fail(Op::ResetPipe, TransportError::Disconnected);

    camera.close();

    assert_eq!(
        transport.calls(),
        [
            Call::AbortPipe(Pipe::In),
            Call::AbortPipe(Pipe::Out),
            Call::FlushPipe(Pipe::In),
            Call::FlushPipe(Pipe::Out),
            Call::ResetPipe(Pipe::In),
            Call::ResetPipe(Pipe::Out),
            Call::SetAlternateSetting(0),
        ]
    );
    assert!(!backend.is_open(CAMERA_PATH));
}

#[test]
fn test_reopen_after_close() {
    let (backend, transport) = camera_backend();
    transport.push_chunk(record(&jpeg(1500, 0x11)));

    let camera = open(&backend);
    camera.start_streaming().unwrap();
    assert_eq!(camera.read_frame_vec(Duration::from_secs(1)).unwrap().len(), 1504);
    camera.close();
    assert!(!backend.is_open(CAMERA_PATH));
    assert_eq!(transport.alternate_setting(), 0);

    transport.push_chunk(record(&jpeg(1500, 0x22)));
    let camera = open(&backend);
    camera.start_streaming().unwrap();
    let frame = camera.read_frame_vec(Duration::from_secs(1)).unwrap();
    assert_eq!(frame[2], 0x22);
    assert_eq!(camera.stats().frames_captured, 1);
    camera.close();
}

#[test]
fn test_reopen_after_close_with_stuck_read() {
    let (backend, transport) = camera_backend();
    let config = CameraConfig { read_timeout_ms: 300, join_timeout_ms: 50, ..fast_config() };
    let camera = OpenOptions::new().config(config).open_path(&backend, CAMERA_PATH).unwrap();
    camera.start_streaming().unwrap();
    thread::sleep(Duration::from_millis(20));

    // abort no longer interrupts the blocked read
    transport.fail(Op::AbortPipe, TransportError::Os(31));
    camera.close();
    assert!(!backend.is_open(CAMERA_PATH));

    transport.clear_failures();
    transport.push_chunk(record(&jpeg(1500, 0x44)));
    let camera = open(&backend);
    camera.start_streaming().unwrap();
    assert_eq!(camera.read_frame_vec(Duration::from_secs(1)).unwrap()[2], 0x44);
}

#[test]
fn test_drop_closes_streaming_session() {
    let (backend, transport) = camera_backend();
    {
        let camera = open(&backend);
        camera.start_streaming().unwrap();
        assert!(backend.is_open(CAMERA_PATH));
    }
    assert!(!backend.is_open(CAMERA_PATH));
    assert_eq!(transport.calls().last(), Some(&Call::SetAlternateSetting(0)));
}

// ── Start / stop ─────────────────────────────────────────────────────

#[test]
fn test_start_sequence() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);
    transport.clear_calls();

    camera.start_streaming().unwrap();
    assert!(camera.is_streaming());

    let calls = transport.calls();
    assert_eq!(
        calls[..5],
        [
            Call::SetAlternateSetting(0),
            Call::ResetPipe(Pipe::In),
            Call::FlushPipe(Pipe::In),
            Call::SetAlternateSetting(1),
            Call::WriteBulk(Pipe::Out, INIT.to_vec()),
        ]
    );
    assert!(wait_for(Duration::from_secs(1), || transport
        .calls()
        .contains(&Call::SetPipeTimeout(Pipe::In, Duration::from_millis(50)))));
}

#[test]
fn test_start_is_idempotent() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);

    camera.start_streaming().unwrap();
    camera.start_streaming().unwrap();

    let writes = transport
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::WriteBulk(..)))
        .count();
    assert_eq!(writes, 1);
}

#[test]
fn test_start_fails_on_alternate_setting() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);
    transport.fail(Op::SetAlternateSetting, TransportError::Stall);

    let err = camera.start_streaming().unwrap_err();
    assert!(matches!(err, CameraError::ProtocolInitFailed(_)));
    assert_eq!(err.code(), -3);
    assert!(!camera.is_streaming());
    assert_eq!(camera.last_error(), Some(err));
}

#[test]
fn test_start_fails_on_init_write() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);

    transport.fail(Op::WriteBulk, TransportError::Timeout);
    assert!(matches!(camera.start_streaming(), Err(CameraError::UsbTransferFailed(_))));
    assert!(!camera.is_streaming());

    transport.clear_failures();
    transport.set_short_write(Some(3));
    let err = camera.start_streaming().unwrap_err();
    assert!(matches!(err, CameraError::UsbTransferFailed(_)));
    assert_eq!(err.code(), -7);
    assert!(!camera.is_streaming());

    transport.set_short_write(None);
    camera.start_streaming().unwrap();
    assert!(camera.is_streaming());
}

#[test]
fn test_stop_is_idempotent() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);

    camera.stop_streaming();
    camera.start_streaming().unwrap();
    camera.stop_streaming();
    camera.stop_streaming();
    assert!(!camera.is_streaming());

    let aborts = transport
        .calls()
        .into_iter()
        .filter(|c| *c == Call::AbortPipe(Pipe::In))
        .count();
    // one on open, one on the single effective stop
    assert_eq!(aborts, 2);
}

#[test]
fn test_no_frames_after_stop() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);
    camera.start_streaming().unwrap();

    transport.push_chunk(record(&jpeg(1500, 0x11)));
    assert!(wait_for_captured(&camera, 1));
    camera.stop_streaming();

    transport.push_chunk(record(&jpeg(1500, 0x22)));
    thread::sleep(Duration::from_millis(100));

    let mut buf = vec![0u8; 4096];
    assert_eq!(
        camera.read_frame(&mut buf, Duration::from_millis(50)),
        Err(CameraError::NotStreaming)
    );
    assert_eq!(camera.stats().frames_captured, 1);
    assert_eq!(transport.pending(), 1);
}

#[test]
fn test_stop_wakes_blocked_reader() {
    let (backend, _transport) = camera_backend();
    let camera = Arc::new(open(&backend));
    camera.start_streaming().unwrap();

    let reader = {
        let camera = Arc::clone(&camera);
        thread::spawn(move || {
            let mut buf = vec![0u8; 4096];
            camera.read_frame(&mut buf, Duration::ZERO)
        })
    };

    thread::sleep(Duration::from_millis(50));
    camera.stop_streaming();
    assert_eq!(reader.join().unwrap(), Err(CameraError::NotStreaming));
}

#[test]
fn test_stop_detaches_unresponsive_loop() {
    let (backend, transport) = camera_backend();
    let config = CameraConfig { read_timeout_ms: 400, join_timeout_ms: 50, ..fast_config() };
    let camera = OpenOptions::new().config(config).open_path(&backend, CAMERA_PATH).unwrap();
    camera.start_streaming().unwrap();
    thread::sleep(Duration::from_millis(20));

    // abort no longer interrupts the blocked read
    transport.fail(Op::AbortPipe, TransportError::Os(31));
    let start = Instant::now();
    camera.stop_streaming();
    assert!(start.elapsed() < Duration::from_millis(350));

    transport.clear_failures();
    transport.push_chunk(record(&jpeg(1500, 0x11)));
    thread::sleep(Duration::from_millis(500));
    assert_eq!(camera.stats().frames_captured, 0);
}

// ── Frame delivery ───────────────────────────────────────────────────

#[test]
fn test_single_record_frame() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);
    camera.start_streaming().unwrap();

    transport.push_chunk(record(&jpeg(1008, 0x5A)));

    let mut buf = vec![0u8; 65536];
    let len = camera.read_frame(&mut buf, Duration::from_secs(1)).unwrap();
    assert_eq!(len, 1012);
    assert_eq!(&buf[..2], &[0xFF, 0xD8]);
    assert_eq!(&buf[1010..1012], &[0xFF, 0xD9]);

    let stats = camera.stats();
    assert_eq!(stats.frames_captured, 1);
    assert_eq!(stats.frames_dropped, 0);
}

#[test]
fn test_frames_delivered_in_order() {
    let (backend, transport) = camera_backend();
    transport.push_chunks((0..3u8).map(|i| record(&jpeg(1500, 0x10 + i))));

    let camera = open(&backend);
    camera.start_streaming().unwrap();

    for i in 0..3u8 {
        let frame = camera.read_frame_vec(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.len(), 1504);
        assert_eq!(frame[2], 0x10 + i);
    }
}

#[test]
fn test_frame_split_across_records() {
    let (backend, transport) = camera_backend();
    let frame = jpeg(3000, 0x33);
    transport.push_chunks([record(&frame[..1]), record(&frame[1..1200]), record(&frame[1200..])]);

    let camera = open(&backend);
    camera.start_streaming().unwrap();

    assert_eq!(camera.read_frame_vec(Duration::from_secs(1)).unwrap(), frame);
    assert_eq!(camera.stats().frames_captured, 1);
}

#[test]
fn test_overflow_drops_oldest() {
    let (backend, transport) = camera_backend();
    let config = CameraConfig { ring_depth: 4, ..fast_config() };
    let recorder = Arc::new(Recorder::default());
    let camera = OpenOptions::new()
        .config(config)
        .observer(recorder.clone())
        .open_path(&backend, CAMERA_PATH)
        .unwrap();

    transport.push_chunks((0..5u8).map(|i| record(&jpeg(1500, 0x10 + i))));
    camera.start_streaming().unwrap();
    assert!(wait_for(Duration::from_secs(2), || recorder.frames.load(Ordering::SeqCst) == 5));

    let stats = camera.stats();
    assert_eq!(stats.frames_captured, 5);
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(recorder.frames.load(Ordering::SeqCst), 5);
    assert_eq!(recorder.drops.load(Ordering::SeqCst), 1);

    for i in 1..5u8 {
        let frame = camera.read_frame_vec(Duration::from_millis(200)).unwrap();
        assert_eq!(frame[2], 0x10 + i);
    }
    assert_eq!(camera.read_frame_vec(Duration::from_millis(50)), Err(CameraError::Timeout));
}

#[test]
fn test_read_times_out() {
    let (backend, _transport) = camera_backend();
    let camera = open(&backend);
    camera.start_streaming().unwrap();

    let mut buf = vec![0u8; 65536];
    let start = Instant::now();
    let result = camera.read_frame(&mut buf, Duration::from_millis(100));
    let elapsed = start.elapsed();

    assert_eq!(result, Err(CameraError::Timeout));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(600));
    assert_eq!(camera.last_error(), Some(CameraError::Timeout));
}

#[test]
fn test_read_with_maximum_timeout() {
    let (backend, transport) = camera_backend();
    transport.push_chunk(record(&jpeg(1500, 0x66)));
    let camera = open(&backend);
    camera.start_streaming().unwrap();
    assert!(wait_for_captured(&camera, 1));

    let mut buf = vec![0u8; 4096];
    assert_eq!(camera.read_frame(&mut buf, Duration::MAX), Ok(1504));
    assert_eq!(buf[2], 0x66);
}

#[test]
fn test_read_argument_errors() {
    let (backend, transport) = camera_backend();
    let camera = open(&backend);

    let mut buf = vec![0u8; 4096];
    assert_eq!(
        camera.read_frame(&mut buf, Duration::from_millis(10)),
        Err(CameraError::NotStreaming)
    );
    assert!(matches!(
        camera.read_frame(&mut [], Duration::from_millis(10)),
        Err(CameraError::InvalidParameter(_))
    ));

    transport.push_chunk(record(&jpeg(1500, 0x11)));
    camera.start_streaming().unwrap();
    assert!(wait_for_captured(&camera, 1));

    let mut small = vec![0u8; 1000];
    assert_eq!(
        camera.read_frame(&mut small, Duration::from_millis(10)),
        Err(CameraError::BufferTooSmall { needed: 1504, available: 1000 })
    );
    assert_eq!(camera.read_frame(&mut buf, Duration::from_millis(10)), Ok(1504));
}

#[test]
fn test_loop_death_leaves_session_streaming() {
    let (backend, transport) = camera_backend();
    let recorder = Arc::new(Recorder::default());
    let camera = OpenOptions::new()
        .config(fast_config())
        .observer(recorder.clone())
        .open_path(&backend, CAMERA_PATH)
        .unwrap();

    transport.push_error(TransportError::Disconnected);
    camera.start_streaming().unwrap();
    assert!(wait_for(Duration::from_secs(1), || !recorder.errors.lock().unwrap().is_empty()));
    assert_eq!(*recorder.errors.lock().unwrap(), [TransportError::Disconnected]);

    transport.push_chunk(record(&jpeg(1500, 0x11)));
    assert_eq!(camera.read_frame_vec(Duration::from_millis(150)), Err(CameraError::Timeout));
    assert!(camera.is_streaming());

    // restart recovers
    camera.stop_streaming();
    camera.start_streaming().unwrap();
    assert_eq!(camera.read_frame_vec(Duration::from_secs(1)).unwrap()[2], 0x11);
}

#[test]
fn test_garbage_is_not_an_error() {
    let (backend, transport) = camera_backend();
    let recorder = Arc::new(Recorder::default());
    let camera = OpenOptions::new()
        .config(fast_config())
        .observer(recorder.clone())
        .open_path(&backend, CAMERA_PATH)
        .unwrap();

    transport.push_chunks([
        vec![0x00, 0x11, 0x22, 0x33],
        record(&[]),
        record(&jpeg(200, 0x44)),
        record(&jpeg(1500, 0x55)),
    ]);
    camera.start_streaming().unwrap();

    let frame = camera.read_frame_vec(Duration::from_secs(1)).unwrap();
    assert_eq!(frame[2], 0x55);
    assert_eq!(camera.stats().frames_captured, 1);
    assert!(recorder.errors.lock().unwrap().is_empty());
    assert_eq!(camera.last_error(), None);
}
