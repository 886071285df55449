//! Mock framebuffer device and recording fallback shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io;
use std::ptr::NonNull;
use std::rc::Rc;

use fbaccel::fbdev::{CopyArea, Device, FillRect, MappedMemory, ScreenInfo};
use fbaccel::{BlitRequest, Blitter, DeviceContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Copy(CopyArea),
    Fill(FillRect),
    ScreenInfo,
    Map(usize),
}

/// Shared view of what the mock device has been asked to do.
pub struct MockState {
    pub copy_ok: Cell<bool>,
    pub fill_ok: Cell<bool>,
    pub map_ok: Cell<bool>,
    pub screen: Cell<ScreenInfo>,
    pub calls: RefCell<Vec<Call>>,
    pub closed: Cell<usize>,
    pub unmapped: Cell<usize>,
}

impl MockState {
    pub fn new(screen: ScreenInfo) -> Rc<Self> {
        Rc::new(Self {
            copy_ok: Cell::new(true),
            fill_ok: Cell::new(true),
            map_ok: Cell::new(true),
            screen: Cell::new(screen),
            calls: RefCell::new(Vec::new()),
            closed: Cell::new(0),
            unmapped: Cell::new(0),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn copies(&self) -> Vec<CopyArea> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Copy(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    pub fn fills(&self) -> Vec<FillRect> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Fill(r) => Some(*r),
                _ => None,
            })
            .collect()
    }
}

/// 640x480 @ 32 bpp with two pages of memory.
pub fn vga_screen() -> ScreenInfo {
    ScreenInfo {
        xres: 640,
        yres: 480,
        bits_per_pixel: 32,
        smem_start: 0x1000_0000,
        smem_len: 2560 * 960,
        line_length: 2560,
    }
}

pub struct MockDevice {
    state: Rc<MockState>,
}

impl MockDevice {
    pub fn new(state: &Rc<MockState>) -> Self {
        Self {
            state: Rc::clone(state),
        }
    }

    fn record(&self, call: Call) {
        self.state.calls.borrow_mut().push(call);
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.closed.set(self.state.closed.get() + 1);
    }
}

fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "mock: request rejected")
}

impl Device for MockDevice {
    type Mapping = HeapMapping;

    fn screen_info(&self) -> io::Result<ScreenInfo> {
        self.record(Call::ScreenInfo);
        Ok(self.state.screen.get())
    }

    fn map(&self, len: usize) -> io::Result<HeapMapping> {
        self.record(Call::Map(len));
        if !self.state.map_ok.get() {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "mock: map failed"));
        }
        Ok(HeapMapping {
            words: vec![0u32; len.div_ceil(4)].into_boxed_slice(),
            state: Rc::clone(&self.state),
        })
    }

    fn copy_area(&self, area: &CopyArea) -> io::Result<()> {
        self.record(Call::Copy(*area));
        if self.state.copy_ok.get() {
            Ok(())
        } else {
            Err(unsupported())
        }
    }

    fn fill_rect(&self, rect: &FillRect) -> io::Result<()> {
        self.record(Call::Fill(*rect));
        if self.state.fill_ok.get() {
            Ok(())
        } else {
            Err(unsupported())
        }
    }
}

/// Heap memory standing in for a framebuffer mapping.
pub struct HeapMapping {
    words: Box<[u32]>,
    state: Rc<MockState>,
}

impl MappedMemory for HeapMapping {
    fn as_ptr(&self) -> NonNull<u8> {
        NonNull::new(self.words.as_ptr() as *mut u8).expect("boxed slice is non-null")
    }

    fn len(&self) -> usize {
        self.words.len() * 4
    }
}

impl Drop for HeapMapping {
    fn drop(&mut self) {
        self.state.unmapped.set(self.state.unmapped.get() + 1);
    }
}

/// Build a context on a fresh mock and forget the probe/setup calls.
pub fn context(state: &Rc<MockState>) -> DeviceContext<MockDevice> {
    let ctx = DeviceContext::from_device(MockDevice::new(state), None)
        .unwrap_or_else(|e| panic!("mock context init failed: {e}"));
    state.clear();
    ctx
}

/// A same-surface copy that satisfies every compatibility check.
pub fn surface_blit<D: Device>(
    ctx: &DeviceContext<D>,
    (sx, sy): (i32, i32),
    (dx, dy): (i32, i32),
    width: i32,
    height: i32,
) -> BlitRequest {
    let g = ctx.geometry();
    let fb = ctx.framebuffer();
    BlitRequest {
        src: fb,
        dst: fb,
        src_stride: g.stride_words as i32,
        dst_stride: g.stride_words as i32,
        src_bpp: g.bits_per_pixel as i32,
        dst_bpp: g.bits_per_pixel as i32,
        src_x: sx,
        src_y: sy,
        dst_x: dx,
        dst_y: dy,
        width,
        height,
    }
}

/// Fallback provider that records what it was handed.
pub struct RecordingBlitter {
    pub result: bool,
    pub calls: RefCell<Vec<BlitRequest>>,
}

impl RecordingBlitter {
    pub fn new(result: bool) -> Rc<Self> {
        Rc::new(Self {
            result,
            calls: RefCell::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<BlitRequest> {
        self.calls.borrow().clone()
    }
}

impl Blitter for RecordingBlitter {
    fn blit(&self, req: &BlitRequest) -> bool {
        self.calls.borrow_mut().push(*req);
        self.result
    }
}
