//! Context construction, probing and teardown against a mock device.

mod common;

use std::ptr::NonNull;

use common::{vga_screen, Call, MockDevice, MockState};
use fbaccel::fbdev::{CopyArea, FillRect, ScreenInfo, ROP_COPY};
use fbaccel::{BufferRef, DeviceContext, InitError};

fn init(state: &std::rc::Rc<MockState>) -> Result<DeviceContext<MockDevice>, InitError> {
    DeviceContext::from_device(MockDevice::new(state), None)
}

#[test]
fn test_probes_run_first_in_order() {
    let state = MockState::new(vga_screen());
    let ctx = init(&state).ok().expect("init should succeed");

    let calls = state.calls();
    assert_eq!(
        calls[0],
        Call::Copy(CopyArea {
            width: 1,
            height: 1,
            ..CopyArea::default()
        })
    );
    assert_eq!(
        calls[1],
        Call::Fill(FillRect {
            rop: ROP_COPY,
            ..FillRect::default()
        })
    );
    assert_eq!(calls[2], Call::ScreenInfo);
    assert_eq!(calls[3], Call::Map(2560 * 960));
    assert_eq!(calls.len(), 4);
    assert!(ctx.owns_framebuffer());
}

#[test]
fn test_geometry_and_defaults() {
    let state = MockState::new(vga_screen());
    let ctx = init(&state).ok().unwrap();

    let g = ctx.geometry();
    assert_eq!((g.width, g.height, g.bits_per_pixel), (640, 480, 32));
    assert_eq!(g.stride_words, 640);
    assert_eq!(g.usable_height, 960);
    assert_eq!(g.framebuffer_size, 2560 * 960);
    assert_eq!(g.framebuffer_paddr, 0x1000_0000);

    assert_eq!(ctx.copy_threshold(), 90);
    assert_eq!(ctx.fill_threshold(), 1 << 24);
    assert!(ctx.capabilities().copy);
    assert!(ctx.capabilities().fill);
    assert!(ctx.fallback().is_none());
}

#[test]
fn test_missing_copy_support_fails_and_closes() {
    let state = MockState::new(vga_screen());
    state.copy_ok.set(false);

    let err = init(&state).err().expect("init should fail");
    assert!(matches!(err, InitError::CopyUnsupported(_)));
    assert_eq!(state.closed.get(), 1);
    // Nothing after the copy probe was attempted.
    assert_eq!(state.calls().len(), 1);
}

#[test]
fn test_missing_fill_support_still_initializes() {
    let state = MockState::new(vga_screen());
    state.fill_ok.set(false);

    let ctx = init(&state).ok().unwrap();
    assert!(!ctx.supports_fill());
    assert!(ctx.capabilities().copy);
    assert_eq!(state.closed.get(), 0);
}

#[test]
fn test_misaligned_stride_fails_without_leaking_handle() {
    let state = MockState::new(ScreenInfo {
        xres: 637,
        yres: 480,
        bits_per_pixel: 8,
        smem_start: 0,
        smem_len: 637 * 480,
        line_length: 637,
    });

    let err = init(&state).err().unwrap();
    assert!(matches!(err, InitError::MisalignedStride { line_length: 637 }));
    assert_eq!(state.closed.get(), 1);
    assert!(!state.calls().iter().any(|c| matches!(c, Call::Map(_))));
}

#[test]
fn test_insufficient_memory_fails_without_leaking_handle() {
    let state = MockState::new(ScreenInfo {
        smem_len: 2560 * 479,
        ..vga_screen()
    });

    let err = init(&state).err().unwrap();
    assert!(matches!(err, InitError::InsufficientMemory { .. }));
    assert!(err.to_string().contains("smaller than visible surface"));
    assert_eq!(state.closed.get(), 1);
    assert_eq!(state.unmapped.get(), 0);
}

#[test]
fn test_map_failure_fails_and_closes() {
    let state = MockState::new(vga_screen());
    state.map_ok.set(false);

    let err = init(&state).err().unwrap();
    assert!(matches!(err, InitError::Map(_)));
    assert_eq!(state.closed.get(), 1);
}

#[test]
fn test_close_releases_device_and_owned_mapping_once() {
    let state = MockState::new(vga_screen());
    let ctx = init(&state).ok().unwrap();
    assert_eq!(state.closed.get(), 0);

    ctx.close();
    assert_eq!(state.closed.get(), 1);
    assert_eq!(state.unmapped.get(), 1);
}

#[test]
fn test_drop_releases_like_close() {
    let state = MockState::new(vga_screen());
    drop(init(&state).ok().unwrap());
    assert_eq!(state.closed.get(), 1);
    assert_eq!(state.unmapped.get(), 1);
}

#[test]
fn test_borrowed_mapping_is_used_but_not_released() {
    let state = MockState::new(vga_screen());
    let mut pixels = vec![0u32; 640 * 960];
    let existing = NonNull::new(pixels.as_mut_ptr().cast::<u8>()).unwrap();

    let ctx = DeviceContext::from_device(MockDevice::new(&state), Some(existing))
        .ok()
        .unwrap();
    assert!(!ctx.owns_framebuffer());
    assert_eq!(ctx.framebuffer(), BufferRef::new(pixels.as_mut_ptr()));
    assert!(!state.calls().iter().any(|c| matches!(c, Call::Map(_))));

    ctx.close();
    assert_eq!(state.closed.get(), 1);
    assert_eq!(state.unmapped.get(), 0);
}
