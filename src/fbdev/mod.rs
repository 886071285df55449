//! Framebuffer device boundary.
//!
//! Everything the acceleration core needs from the outside world goes through
//! the [`Device`] trait: the screen geometry queries, mapping the pixel memory,
//! and the two accelerated request primitives. [`linux::FramebufferDevice`] is
//! the real `/dev/fbN` implementation; tests substitute their own.

use std::io;
use std::ptr::NonNull;

use serde::Serialize;

pub mod linux;

pub use linux::{FramebufferDevice, MmapRegion};

/// Device node used when no path is configured.
pub const DEFAULT_DEVICE: &str = "/dev/fb0";

/// Raster operation: replace destination pixels.
pub const ROP_COPY: u32 = 0;
/// Raster operation: xor with destination pixels.
pub const ROP_XOR: u32 = 1;

// ioctl request encoding (asm-generic layout)
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;
const IOC_WRITE: u32 = 1;

const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    (IOC_WRITE << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

pub const FBIOGET_VSCREENINFO: u32 = 0x4600;
pub const FBIOGET_FSCREENINFO: u32 = 0x4602;
/// Non-standard ioctl exposing the driver's `fb_copyarea` hook.
pub const FBIOCOPYAREA: u32 = iow(b'z', 0x21, std::mem::size_of::<CopyArea>());
/// Non-standard ioctl exposing the driver's `fb_fillrect` hook.
pub const FBIOFILLRECT: u32 = iow(b'z', 0x22, std::mem::size_of::<FillRect>());

/// `struct fb_copyarea` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyArea {
    pub dx: u32,
    pub dy: u32,
    pub width: u32,
    pub height: u32,
    pub sx: u32,
    pub sy: u32,
}

/// `struct fb_fillrect` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillRect {
    pub dx: u32,
    pub dy: u32,
    pub width: u32,
    pub height: u32,
    pub color: u32,
    pub rop: u32,
}

/// The subset of the variable and fixed screen info the core cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScreenInfo {
    /// Visible horizontal resolution in pixels.
    pub xres: u32,
    /// Visible vertical resolution in pixels.
    pub yres: u32,
    pub bits_per_pixel: u32,
    /// Physical start of the framebuffer memory.
    pub smem_start: u64,
    /// Total addressable framebuffer memory in bytes.
    pub smem_len: u32,
    /// Row stride in bytes.
    pub line_length: u32,
}

/// A byte-addressable region backing the destination surface.
///
/// Implementations release the region when dropped.
pub trait MappedMemory {
    fn as_ptr(&self) -> NonNull<u8>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open accelerator device.
///
/// Dropping the value closes the device. Each primitive maps to exactly one
/// blocking request and reports the OS error on failure.
pub trait Device {
    type Mapping: MappedMemory;

    fn screen_info(&self) -> io::Result<ScreenInfo>;

    /// Map `len` bytes of framebuffer memory, read/write and shared.
    fn map(&self, len: usize) -> io::Result<Self::Mapping>;

    fn copy_area(&self, area: &CopyArea) -> io::Result<()>;

    fn fill_rect(&self, rect: &FillRect) -> io::Result<()>;
}
