//! # Transport & Discovery Abstractions
//!
//! This module defines the seams between the driver core and the USB stack:
//!
//! - **Transport**: blocking bulk-pipe I/O on an already opened interface
//! - **DeviceBackend**: enumeration and exclusive open-by-path
//!
//! ## Design Rationale
//!
//! Every `Transport` method takes `&self`. The read loop blocks inside
//! [`Transport::read_bulk`] on its own thread while the session calls
//! [`Transport::abort_pipe`] from another one to interrupt it, so
//! implementations must be internally synchronized (`Send + Sync`).
//!
//! The traits are synchronous on purpose: the camera is driven by one
//! dedicated reader thread, and every call carries an explicit timeout.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use crate::protocol::{EP_IN, EP_OUT};

/// Errors reported by a transport implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The operation did not complete within its timeout
    Timeout,
    /// The operation was cancelled by `abort_pipe`
    Aborted,
    /// The device went away
    Disconnected,
    /// The endpoint stalled
    Stall,
    /// The device is already opened by someone else
    Busy,
    /// The device path does not exist
    NotFound,
    /// The capability is not available on this transport
    NotSupported,
    /// Any other OS-level failure, with the platform error code
    Os(u32),
}

impl TransportError {
    /// Whether this error only means "no data yet"
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "transfer timed out"),
            TransportError::Aborted => write!(f, "transfer aborted"),
            TransportError::Disconnected => write!(f, "device disconnected"),
            TransportError::Stall => write!(f, "endpoint stalled"),
            TransportError::Busy => write!(f, "device is in use"),
            TransportError::NotFound => write!(f, "device not found"),
            TransportError::NotSupported => write!(f, "operation not supported"),
            TransportError::Os(code) => write!(f, "os error {} (0x{:x})", code, code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Bulk pipe of the camera interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pipe {
    /// Video stream, device to host
    In,
    /// Commands, host to device
    Out,
}

impl Pipe {
    /// Endpoint address of this pipe
    pub const fn endpoint(self) -> u8 {
        match self {
            Pipe::In => EP_IN,
            Pipe::Out => EP_OUT,
        }
    }
}

/// Interface descriptor fields used for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub num_endpoints: u8,
}

/// A camera candidate reported by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Platform path used to open the device
    pub path: String,
    /// Human readable description
    pub description: String,
}

/// Blocking bulk-pipe I/O on an opened camera interface
///
/// # Example
///
/// ```ignore
/// fn send_init<T: Transport>(t: &T) -> TransportResult<()> {
///     t.set_alternate_setting(ALT_SETTING_STREAMING)?;
///     let sent = t.write_bulk(Pipe::Out, &INIT_COMMAND, Duration::from_secs(1))?;
///     assert_eq!(sent, INIT_COMMAND.len());
///     Ok(())
/// }
/// ```
pub trait Transport: Send + Sync {
    /// Read up to `buf.len()` bytes from a bulk pipe
    ///
    /// Returns the number of bytes read. Must return
    /// [`TransportError::Aborted`] promptly once `abort_pipe` is called for
    /// the same pipe from another thread.
    fn read_bulk(&self, pipe: Pipe, buf: &mut [u8], timeout: Duration) -> TransportResult<usize>;

    /// Write `data` to a bulk pipe, returning the number of bytes accepted
    fn write_bulk(&self, pipe: Pipe, data: &[u8], timeout: Duration) -> TransportResult<usize>;

    /// Select an alternate setting of the camera interface
    fn set_alternate_setting(&self, setting: u8) -> TransportResult<()>;

    /// Cancel all pending transfers on a pipe
    fn abort_pipe(&self, pipe: Pipe) -> TransportResult<()>;

    /// Discard any data cached for a pipe
    fn flush_pipe(&self, pipe: Pipe) -> TransportResult<()>;

    /// Clear the halt condition and data toggle of a pipe
    fn reset_pipe(&self, pipe: Pipe) -> TransportResult<()>;

    /// Query the descriptor of the active interface setting
    fn query_interface(&self) -> TransportResult<InterfaceDescriptor>;

    /// Set the default transfer timeout policy of a pipe
    ///
    /// Transports that only honour per-call timeouts can keep the default.
    fn set_pipe_timeout(&self, _pipe: Pipe, _timeout: Duration) -> TransportResult<()> {
        Ok(())
    }

    /// Request raw (unbuffered, high-throughput) I/O on a pipe if available
    fn set_raw_io(&self, _pipe: Pipe, _enable: bool) -> TransportResult<()> {
        Err(TransportError::NotSupported)
    }
}

/// Device enumeration and exclusive open
pub trait DeviceBackend {
    /// Transport produced by a successful open
    type Transport: Transport + 'static;

    /// List every interface path the platform reports
    ///
    /// Filtering to camera paths is done by the caller.
    fn enumerate(&self) -> TransportResult<Vec<DeviceInfo>>;

    /// Open `path` exclusively
    fn open(&self, path: &str) -> TransportResult<Self::Transport>;
}
