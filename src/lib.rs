//! fbaccel -- framebuffer blit/fill acceleration with fallback chaining.
//!
//! This crate decides, per request, whether a rectangle copy or solid fill
//! can be serviced by the framebuffer driver's copyarea/fillrect ioctls, and
//! hands copies it cannot service to a substitutable fallback provider.

pub mod accel;
pub mod config;
pub mod fbdev;
pub mod selftest;

pub use accel::{
    BlitRequest, Blitter, BufferRef, Decision, Decline, DeviceContext, FillRequest, Filler,
    InitError,
};
