//! Camera discovery over a [`DeviceBackend`].
//!
//! Platforms report interface paths such as
//! `\\?\usb#vid_2ce3&pid_3828&mi_01#...`. The vendor bulk interface is
//! `mi_01`; a path without an interface suffix is still accepted as a generic
//! candidate, after every vendor interface.

use log::{debug, warn};
use shared::{DeviceBackend, DeviceInfo, PRODUCT_ID, VENDOR_ID};

use crate::error::{CameraError, Result};

const VID_TAG: &str = "vid_2ce3";
const PID_TAG: &str = "pid_3828";
const VENDOR_INTERFACE_TAG: &str = "mi_01";

/// How well a path matches the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathMatch {
    /// The vendor bulk interface
    VendorInterface,
    /// Right VID/PID, interface unknown
    Generic,
}

/// Classify a platform device path, case-insensitively
pub fn classify_path(path: &str) -> Option<PathMatch> {
    let lower = path.to_ascii_lowercase();
    if !lower.contains(VID_TAG) || !lower.contains(PID_TAG) {
        return None;
    }
    if lower.contains(VENDOR_INTERFACE_TAG) {
        Some(PathMatch::VendorInterface)
    } else {
        Some(PathMatch::Generic)
    }
}

/// List camera paths, vendor interfaces first
///
/// Backend order is kept within each group. A backend that cannot enumerate
/// reports `DeviceNotFound`; an empty result is not an error.
pub fn enumerate<B: DeviceBackend>(backend: &B) -> Result<Vec<DeviceInfo>> {
    let devices = backend.enumerate().map_err(|e| {
        warn!("Device enumeration failed: {}", e);
        CameraError::DeviceNotFound
    })?;

    let mut cameras: Vec<(PathMatch, DeviceInfo)> = devices
        .into_iter()
        .filter_map(|mut info| {
            let kind = classify_path(&info.path)?;
            info.vendor_id = VENDOR_ID;
            info.product_id = PRODUCT_ID;
            if info.description.is_empty() {
                info.description = match kind {
                    PathMatch::VendorInterface => "Useeplus SuperCamera".into(),
                    PathMatch::Generic => "Useeplus SuperCamera (generic interface)".into(),
                };
            }
            Some((kind, info))
        })
        .collect();
    cameras.sort_by_key(|(kind, _)| *kind);

    debug!("Found {} camera path(s)", cameras.len());
    Ok(cameras.into_iter().map(|(_, info)| info).collect())
}
