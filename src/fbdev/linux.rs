use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use libc::{c_ulong, c_void};
use tracing::{debug, trace};

use super::{
    CopyArea, Device, FillRect, MappedMemory, ScreenInfo, FBIOCOPYAREA, FBIOFILLRECT,
    FBIOGET_FSCREENINFO, FBIOGET_VSCREENINFO,
};

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// `struct fb_var_screeninfo`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// An open `/dev/fbN` node.
///
/// The descriptor is owned by the contained [`File`] and closed when this
/// value is dropped.
#[derive(Debug)]
pub struct FramebufferDevice {
    file: File,
    path: PathBuf,
}

impl FramebufferDevice {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!(path = %path.display(), fd = file.as_raw_fd(), "opened framebuffer device");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Issue one ioctl, translating the `0 = success` convention to `io::Result`.
    fn ioctl<T>(&self, request: u32, arg: *mut T) -> io::Result<()> {
        let ret = unsafe { libc::ioctl(self.fd(), request as _, arg) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Device for FramebufferDevice {
    type Mapping = MmapRegion;

    fn screen_info(&self) -> io::Result<ScreenInfo> {
        let mut var = FbVarScreeninfo::default();
        let mut fix = FbFixScreeninfo::default();
        self.ioctl(FBIOGET_VSCREENINFO, &mut var)?;
        self.ioctl(FBIOGET_FSCREENINFO, &mut fix)?;

        Ok(ScreenInfo {
            xres: var.xres,
            yres: var.yres,
            bits_per_pixel: var.bits_per_pixel,
            smem_start: u64::from(fix.smem_start),
            smem_len: fix.smem_len,
            line_length: fix.line_length,
        })
    }

    fn map(&self, len: usize) -> io::Result<MmapRegion> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::other("mmap returned null"))?;
        debug!(len, "mapped framebuffer memory");
        Ok(MmapRegion { ptr, len })
    }

    fn copy_area(&self, area: &CopyArea) -> io::Result<()> {
        let mut area = *area;
        trace!(?area, "FBIOCOPYAREA");
        self.ioctl(FBIOCOPYAREA, &mut area)
    }

    fn fill_rect(&self, rect: &FillRect) -> io::Result<()> {
        let mut rect = *rect;
        trace!(?rect, "FBIOFILLRECT");
        self.ioctl(FBIOFILLRECT, &mut rect)
    }
}

/// A shared read/write mapping of framebuffer memory, unmapped on drop.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedMemory for MmapRegion {
    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.ptr.as_ptr() as *mut c_void, self.len) };
        if ret != 0 {
            tracing::warn!(error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}
