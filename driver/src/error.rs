//! Error taxonomy exposed to camera applications.

use shared::TransportError;
use thiserror::Error;

/// Errors returned by session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("No camera found")]
    DeviceNotFound,
    #[error("Failed to open device {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: TransportError,
    },
    #[error("Protocol init failed: {0}")]
    ProtocolInitFailed(String),
    #[error("USB transfer failed: {0}")]
    UsbTransferFailed(String),
    #[error("Timeout waiting for frame")]
    Timeout,
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Camera is not streaming")]
    NotStreaming,
}

impl CameraError {
    /// Integer code used by the C-style camera API
    ///
    /// Success is `0`; every error is negative.
    pub fn code(&self) -> i32 {
        match self {
            CameraError::DeviceNotFound => -1,
            CameraError::OpenFailed { .. } => -2,
            CameraError::ProtocolInitFailed(_) => -3,
            CameraError::NotStreaming => -4,
            CameraError::BufferTooSmall { .. } => -5,
            CameraError::InvalidParameter(_) => -6,
            CameraError::UsbTransferFailed(_) => -7,
            CameraError::Timeout => -8,
        }
    }

    pub(crate) fn transfer(context: &str, err: TransportError) -> Self {
        CameraError::UsbTransferFailed(format!("{context}: {err}"))
    }

    pub(crate) fn init(context: &str, err: impl std::fmt::Display) -> Self {
        CameraError::ProtocolInitFailed(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;
