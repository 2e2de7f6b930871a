//! V4L2 device discovery
//!
//! UVC cameras register several nodes per physical device (video capture
//! plus metadata); only nodes advertising the capture capability are
//! usable here.

use std::path::PathBuf;

use v4l::capability::Flags;
use v4l::Device;

use crate::error::DeviceError;

/// An opened capture device together with its node path and card name
pub struct CaptureDevice {
    pub device: Device,
    pub path: PathBuf,
    pub card: String,
}

/// Open the first V4L2 node that is an actual video capture device.
pub fn open_first_capture_device() -> Result<CaptureDevice, DeviceError> {
    let mut nodes = v4l::context::enum_devices();
    nodes.sort_by_key(|node| node.index());

    let mut last_error: Option<DeviceError> = None;

    for node in nodes {
        let path = node.path().to_path_buf();

        let device = match Device::with_path(&path) {
            Ok(device) => device,
            Err(e) => {
                tracing::debug!(path = %path.display(), "cannot open node: {}", e);
                last_error = Some(DeviceError::OpenFailed(
                    path.display().to_string(),
                    e.to_string(),
                ));
                continue;
            }
        };

        let caps = match device.query_caps() {
            Ok(caps) => caps,
            Err(e) => {
                tracing::debug!(path = %path.display(), "capability query failed: {}", e);
                last_error = Some(DeviceError::CapabilityQuery(
                    path.display().to_string(),
                    e.to_string(),
                ));
                continue;
            }
        };

        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            tracing::debug!(path = %path.display(), "skipping non-capture node");
            continue;
        }

        tracing::info!(
            path = %path.display(),
            card = %caps.card,
            driver = %caps.driver,
            bus = %caps.bus,
            "opened capture device"
        );

        return Ok(CaptureDevice {
            device,
            path,
            card: caps.card,
        });
    }

    Err(last_error.unwrap_or(DeviceError::NotFound))
}
