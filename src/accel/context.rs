use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::accel::probe::{self, Capabilities};
use crate::accel::{
    area, BlitRequest, Blitter, BufferRef, Decision, Decline, FillRequest, Filler,
    DEFAULT_COPY_THRESHOLD, DEFAULT_FILL_THRESHOLD,
};
use crate::config::ThresholdConfig;
use crate::fbdev::{
    CopyArea, Device, FillRect, FramebufferDevice, MappedMemory, ScreenInfo, DEFAULT_DEVICE,
    ROP_COPY,
};

/// Size of one pixel-buffer element in bytes.
const WORD_BYTES: u32 = 4;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("device does not support accelerated copyarea: {0}")]
    CopyUnsupported(#[source] io::Error),

    #[error("failed to query screen info: {0}")]
    ScreenInfo(#[source] io::Error),

    #[error("line length {line_length} is not a multiple of 4 bytes")]
    MisalignedStride { line_length: u32 },

    #[error("framebuffer memory ({available} bytes) smaller than visible surface ({required} bytes)")]
    InsufficientMemory { available: usize, required: usize },

    #[error("malformed geometry: {xres}x{yres} at {bits_per_pixel} bpp")]
    MalformedGeometry {
        xres: u32,
        yres: u32,
        bits_per_pixel: u32,
    },

    #[error("failed to map framebuffer memory: {0}")]
    Map(#[source] io::Error),
}

/// Layout of the managed surface, derived from the device's screen info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Row stride in 32-bit words.
    pub stride_words: u32,
    pub framebuffer_paddr: u64,
    /// Addressable framebuffer memory in bytes.
    pub framebuffer_size: usize,
    /// Rows of `width` pixels that fit in the framebuffer memory.
    pub usable_height: u32,
    /// Bytes covered by the visible surface.
    pub visible_size: usize,
}

impl SurfaceGeometry {
    pub fn from_screen_info(info: &ScreenInfo) -> Result<Self, InitError> {
        if info.line_length % WORD_BYTES != 0 {
            return Err(InitError::MisalignedStride {
                line_length: info.line_length,
            });
        }

        let malformed = || InitError::MalformedGeometry {
            xres: info.xres,
            yres: info.yres,
            bits_per_pixel: info.bits_per_pixel,
        };

        let row_bytes = info.xres as u64 * info.bits_per_pixel as u64 / 8;
        if row_bytes == 0 {
            return Err(malformed());
        }
        let visible_size =
            usize::try_from(row_bytes * info.yres as u64).map_err(|_| malformed())?;
        let framebuffer_size = info.smem_len as usize;

        if framebuffer_size < visible_size {
            return Err(InitError::InsufficientMemory {
                available: framebuffer_size,
                required: visible_size,
            });
        }

        Ok(Self {
            width: info.xres,
            height: info.yres,
            bits_per_pixel: info.bits_per_pixel,
            stride_words: info.line_length / WORD_BYTES,
            framebuffer_paddr: info.smem_start,
            framebuffer_size,
            usable_height: (info.smem_len as u64 / row_bytes) as u32,
            visible_size,
        })
    }
}

/// Pixel memory of the managed surface.
enum Framebuffer<M> {
    /// Mapped by us, unmapped on drop.
    Owned(M),
    /// Mapped by someone else; never released here.
    Borrowed(NonNull<u8>),
}

impl<M: MappedMemory> Framebuffer<M> {
    fn addr(&self) -> NonNull<u8> {
        match self {
            Framebuffer::Owned(m) => m.as_ptr(),
            Framebuffer::Borrowed(p) => *p,
        }
    }
}

/// The accelerated blit/fill provider for one framebuffer device.
///
/// Not internally synchronized: concurrent dispatch on one context relies on
/// the driver to serialize requests. Only the thresholds may change after
/// construction.
pub struct DeviceContext<D: Device = FramebufferDevice> {
    // Field order is drop order: unmap before closing the device.
    framebuffer: Framebuffer<D::Mapping>,
    device: D,
    geometry: SurfaceGeometry,
    supports_fill: bool,
    copy_threshold: AtomicU64,
    fill_threshold: AtomicU64,
    fallback: Option<Rc<dyn Blitter>>,
}

impl DeviceContext<FramebufferDevice> {
    /// Open `device_path` (default `/dev/fb0`) and build a context on it.
    ///
    /// `existing_mapping` is an already-mapped view of the framebuffer owned
    /// by the caller; when absent the context maps the memory itself.
    pub fn init(
        device_path: Option<&Path>,
        existing_mapping: Option<NonNull<u8>>,
    ) -> Result<Self, InitError> {
        let path = device_path.unwrap_or_else(|| Path::new(DEFAULT_DEVICE));
        let device = FramebufferDevice::open(path).map_err(|source| InitError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "initializing framebuffer acceleration");
        Self::from_device(device, existing_mapping)
    }
}

impl<D: Device> DeviceContext<D> {
    /// Build a context on an already-open device.
    ///
    /// On error the device (and any mapping made here) is dropped before
    /// returning, so nothing stays open.
    pub fn from_device(
        device: D,
        existing_mapping: Option<NonNull<u8>>,
    ) -> Result<Self, InitError> {
        probe::probe_copy(&device).map_err(InitError::CopyUnsupported)?;
        let supports_fill = probe::probe_fill(&device);

        let info = device.screen_info().map_err(InitError::ScreenInfo)?;
        let geometry = SurfaceGeometry::from_screen_info(&info)?;

        let framebuffer = match existing_mapping {
            Some(ptr) => Framebuffer::Borrowed(ptr),
            None => Framebuffer::Owned(
                device
                    .map(geometry.framebuffer_size)
                    .map_err(InitError::Map)?,
            ),
        };

        info!(
            width = geometry.width,
            height = geometry.height,
            bpp = geometry.bits_per_pixel,
            stride_words = geometry.stride_words,
            usable_height = geometry.usable_height,
            fill = supports_fill,
            borrowed = matches!(framebuffer, Framebuffer::Borrowed(_)),
            "framebuffer acceleration ready"
        );

        Ok(Self {
            framebuffer,
            device,
            geometry,
            supports_fill,
            copy_threshold: AtomicU64::new(DEFAULT_COPY_THRESHOLD),
            fill_threshold: AtomicU64::new(DEFAULT_FILL_THRESHOLD),
            fallback: None,
        })
    }

    /// Release the device and, when owned, the mapping.
    pub fn close(self) {
        info!(borrowed = !self.owns_framebuffer(), "closing framebuffer acceleration");
        drop(self);
    }

    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            copy: true,
            fill: self.supports_fill,
        }
    }

    pub fn supports_fill(&self) -> bool {
        self.supports_fill
    }

    /// The managed surface's pixel buffer. Only requests naming this buffer
    /// are eligible for acceleration.
    pub fn framebuffer(&self) -> BufferRef {
        BufferRef::from_bytes(self.framebuffer.addr().as_ptr())
    }

    pub fn owns_framebuffer(&self) -> bool {
        matches!(self.framebuffer, Framebuffer::Owned(_))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn copy_threshold(&self) -> u64 {
        self.copy_threshold.load(Ordering::Relaxed)
    }

    pub fn set_copy_threshold(&self, pixels: u64) {
        debug!(pixels, "copy threshold updated");
        self.copy_threshold.store(pixels, Ordering::Relaxed);
    }

    pub fn fill_threshold(&self) -> u64 {
        self.fill_threshold.load(Ordering::Relaxed)
    }

    pub fn set_fill_threshold(&self, pixels: u64) {
        debug!(pixels, "fill threshold updated");
        self.fill_threshold.store(pixels, Ordering::Relaxed);
    }

    pub fn apply_thresholds(&self, thresholds: &ThresholdConfig) {
        self.set_copy_threshold(thresholds.copy);
        self.set_fill_threshold(thresholds.fill);
    }

    /// Register (or clear) the provider that receives declined copies.
    pub fn set_fallback(&mut self, fallback: Option<Rc<dyn Blitter>>) {
        self.fallback = fallback;
    }

    pub fn with_fallback(mut self, fallback: Rc<dyn Blitter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn fallback(&self) -> Option<&Rc<dyn Blitter>> {
        self.fallback.as_ref()
    }

    /// Decide how a copy would be handled, using the current threshold.
    pub fn plan_copy(&self, req: &BlitRequest) -> Decision {
        let Some(pixels) = area(req.width, req.height) else {
            return Decision::Noop;
        };

        let g = &self.geometry;
        if req.src_bpp != req.dst_bpp || req.src_bpp as i64 != g.bits_per_pixel as i64 {
            return Decision::Decline(Decline::DepthMismatch);
        }
        if req.src_stride != req.dst_stride || req.src_stride as i64 != g.stride_words as i64 {
            return Decision::Decline(Decline::StrideMismatch);
        }
        let fb = self.framebuffer();
        if req.src != req.dst || req.src != fb {
            return Decision::Decline(Decline::ForeignBuffer);
        }
        if pixels < self.copy_threshold() {
            return Decision::Decline(Decline::BelowThreshold);
        }
        if [req.src_x, req.src_y, req.dst_x, req.dst_y]
            .iter()
            .any(|&v| v < 0)
        {
            return Decision::Decline(Decline::NegativeOrigin);
        }
        Decision::Accelerate
    }

    /// Decide how a fill would be handled, using the current threshold.
    pub fn plan_fill(&self, req: &FillRequest) -> Decision {
        let Some(pixels) = area(req.width, req.height) else {
            return Decision::Noop;
        };
        if !self.supports_fill {
            return Decision::Decline(Decline::FillUnsupported);
        }
        if req.dst != self.framebuffer() {
            return Decision::Decline(Decline::ForeignBuffer);
        }
        if pixels < self.fill_threshold() {
            return Decision::Decline(Decline::BelowThreshold);
        }
        if req.dst_x < 0 || req.dst_y < 0 {
            return Decision::Decline(Decline::NegativeOrigin);
        }
        Decision::Accelerate
    }

    /// Hand a declined copy to the fallback, unchanged.
    fn fallback_blit(&self, req: &BlitRequest, reason: Decline) -> bool {
        match &self.fallback {
            Some(fallback) => {
                debug!(%reason, w = req.width, h = req.height, "copy delegated to fallback");
                fallback.blit(req)
            }
            None => {
                debug!(%reason, w = req.width, h = req.height, "copy declined, no fallback");
                false
            }
        }
    }
}

impl<D: Device> Blitter for DeviceContext<D> {
    fn blit(&self, req: &BlitRequest) -> bool {
        match self.plan_copy(req) {
            Decision::Noop => true,
            Decision::Decline(reason) => self.fallback_blit(req, reason),
            Decision::Accelerate => {
                let copy = CopyArea {
                    sx: req.src_x as u32,
                    sy: req.src_y as u32,
                    dx: req.dst_x as u32,
                    dy: req.dst_y as u32,
                    width: req.width as u32,
                    height: req.height as u32,
                };
                debug!(
                    "copyarea: src {},{} dst {},{} size {}x{}",
                    req.src_x, req.src_y, req.dst_x, req.dst_y, req.width, req.height
                );
                match self.device.copy_area(&copy) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "copyarea request failed");
                        false
                    }
                }
            }
        }
    }

    fn filler(&self) -> Option<&dyn Filler> {
        if self.supports_fill {
            Some(self)
        } else {
            None
        }
    }
}

impl<D: Device> Filler for DeviceContext<D> {
    fn fill(&self, req: &FillRequest) -> bool {
        match self.plan_fill(req) {
            Decision::Noop => true,
            Decision::Decline(reason) => {
                debug!(%reason, w = req.width, h = req.height, "fill declined");
                false
            }
            Decision::Accelerate => {
                let rect = FillRect {
                    dx: req.dst_x as u32,
                    dy: req.dst_y as u32,
                    width: req.width as u32,
                    height: req.height as u32,
                    color: req.color,
                    rop: ROP_COPY,
                };
                debug!(
                    "fillrect: {},{} {}x{} bpp {} color {:#010x}",
                    req.dst_x, req.dst_y, req.width, req.height, req.dst_bpp, req.color
                );
                match self.device.fill_rect(&rect) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "fillrect request failed");
                        false
                    }
                }
            }
        }
    }
}
