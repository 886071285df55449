//! Runtime capability detection.
//!
//! The drivers exposing these ioctls give no feature query, so each capability
//! is detected by issuing a request that leaves the screen unchanged.

use std::io;

use serde::Serialize;
use tracing::debug;

use crate::fbdev::{CopyArea, Device, FillRect, ROP_COPY};

/// What the device accepted during probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub copy: bool,
    pub fill: bool,
}

/// Copy the top-left pixel onto itself.
pub fn probe_copy<D: Device>(device: &D) -> io::Result<()> {
    let area = CopyArea {
        width: 1,
        height: 1,
        ..CopyArea::default()
    };
    let result = device.copy_area(&area);
    debug!(ok = result.is_ok(), "copyarea probe");
    result
}

/// Fill an empty rectangle at the origin.
pub fn probe_fill<D: Device>(device: &D) -> bool {
    let rect = FillRect {
        rop: ROP_COPY,
        ..FillRect::default()
    };
    match device.fill_rect(&rect) {
        Ok(()) => {
            debug!("fillrect probe succeeded");
            true
        }
        Err(e) => {
            debug!(error = %e, "fillrect probe failed");
            false
        }
    }
}

/// Probe both capabilities without failing on either.
pub fn probe<D: Device>(device: &D) -> Capabilities {
    Capabilities {
        copy: probe_copy(device).is_ok(),
        fill: probe_fill(device),
    }
}
