//! Blit/fill acceleration -- framebuffer copyarea/fillrect with fallback chaining.
//!
//! A [`Blitter`] services rectangular copies; it may also expose a [`Filler`]
//! for solid fills. [`DeviceContext`] is the accelerated provider: it routes
//! every request either to the device or, for copies, to another `Blitter`
//! registered as its fallback.

use std::fmt;

use serde::Serialize;

pub mod context;
pub mod probe;

pub use context::{DeviceContext, InitError, SurfaceGeometry};
pub use probe::Capabilities;

/// Fewer pixels than this and a copy goes to the fallback.
pub const DEFAULT_COPY_THRESHOLD: u64 = 90;
/// Fewer pixels than this and a fill is rejected.
pub const DEFAULT_FILL_THRESHOLD: u64 = 1 << 24;

/// Identity of a pixel buffer, compared by address only.
///
/// The core never dereferences it; it is passed through to fallbacks as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRef(*mut u32);

impl BufferRef {
    pub fn new(ptr: *mut u32) -> Self {
        Self(ptr)
    }

    pub fn from_bytes(ptr: *mut u8) -> Self {
        Self(ptr.cast())
    }

    pub fn as_ptr(self) -> *mut u32 {
        self.0
    }
}

impl fmt::Debug for BufferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferRef({:p})", self.0)
    }
}

/// Arguments of an (possibly overlapping) rectangle copy.
///
/// Strides are in 32-bit words, matching the buffer element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRequest {
    pub src: BufferRef,
    pub dst: BufferRef,
    pub src_stride: i32,
    pub dst_stride: i32,
    pub src_bpp: i32,
    pub dst_bpp: i32,
    pub src_x: i32,
    pub src_y: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
}

/// Arguments of a solid rectangle fill. `color` is already packed in the
/// destination pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillRequest {
    pub dst: BufferRef,
    pub dst_stride: i32,
    pub dst_bpp: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
    pub color: u32,
}

/// Pixel count of a `width` x `height` rectangle, or `None` when degenerate.
pub(crate) fn area(width: i32, height: i32) -> Option<u64> {
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(width as u64 * height as u64)
}

/// A provider of rectangle copies.
///
/// Returns `true` when the pixels were handled. A provider that cannot handle
/// a request returns `false`; it never panics.
pub trait Blitter {
    fn blit(&self, req: &BlitRequest) -> bool;

    /// The fill capability, when this provider has one.
    fn filler(&self) -> Option<&dyn Filler> {
        None
    }
}

/// A provider of solid fills.
pub trait Filler {
    fn fill(&self, req: &FillRequest) -> bool;
}

/// How a dispatcher resolves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    /// Zero-area rectangle; succeeds without touching anything.
    Noop,
    /// Issue the device request.
    Accelerate,
    /// Not for the device: copies go to the fallback, fills fail.
    Decline(Decline),
}

/// Why the device path was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decline {
    /// The probe found no fill support.
    FillUnsupported,
    /// Source, destination and surface depths differ.
    DepthMismatch,
    /// Source, destination and surface strides differ.
    StrideMismatch,
    /// A buffer other than the managed surface is involved.
    ForeignBuffer,
    /// An origin cannot be encoded in the device request.
    NegativeOrigin,
    /// Too few pixels to be worth the device round trip.
    BelowThreshold,
}

impl fmt::Display for Decline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decline::FillUnsupported => "fill unsupported",
            Decline::DepthMismatch => "bits-per-pixel mismatch",
            Decline::StrideMismatch => "stride mismatch",
            Decline::ForeignBuffer => "foreign buffer",
            Decline::NegativeOrigin => "negative origin",
            Decline::BelowThreshold => "below threshold",
        };
        f.write_str(s)
    }
}
