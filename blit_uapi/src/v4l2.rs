//! the subset of video4linux2 used by mem2mem scalers
use rustix::{
    fd::AsFd,
    ioctl::{self, opcode, Getter, Opcode, Setter, Updater},
};
use std::ffi::c_ulong;

pub const BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;
pub const BUF_TYPE_VIDEO_OUTPUT_MPLANE: u32 = 10;

pub const MEMORY_USERPTR: u32 = 2;
pub const MEMORY_DMABUF: u32 = 4;

pub const BUF_FLAG_ERROR: u32 = 0x0000_0040;
pub const BUF_FLAG_USE_SYNC: u32 = 0x0000_8000;
pub const BUF_FLAG_IN_FENCE: u32 = 0x0020_0000;
pub const BUF_FLAG_OUT_FENCE: u32 = 0x0040_0000;

pub const CAP_FENCES: u32 = 0x2000_0000;

pub const VIDEO_MAX_PLANES: usize = 8;

pub const CID_HFLIP: u32 = 0x0098_0914;
pub const CID_VFLIP: u32 = 0x0098_0915;
pub const CID_ROTATE: u32 = 0x0098_0922;

const CID_USER_CLASS: u32 = 0x0098_0000;
pub const EXYNOS_CID_BASE: u32 = CID_USER_CLASS | 0x2000;
pub const CID_CONTENT_PROTECTION: u32 = EXYNOS_CID_BASE + 201;
pub const CID_CSC_EQ: u32 = EXYNOS_CID_BASE + 101;
pub const CID_CSC_RANGE: u32 = EXYNOS_CID_BASE + 102;
pub const CID_FRAMERATE: u32 = EXYNOS_CID_BASE + 110;

pub const COLORSPACE_DEFAULT: u32 = 0;
pub const COLORSPACE_SMPTE170M: u32 = 1;
pub const COLORSPACE_REC709: u32 = 3;
pub const COLORSPACE_JPEG: u32 = 7;
pub const COLORSPACE_SRGB: u32 = 8;
pub const COLORSPACE_BT2020: u32 = 10;
pub const COLORSPACE_DCI_P3: u32 = 12;

pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanePixFormat {
    pub sizeimage: u32,
    pub bytesperline: u32,
    pub reserved: [u16; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PixFormatMplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub colorspace: u32,
    pub plane_fmt: [PlanePixFormat; VIDEO_MAX_PLANES],
    pub num_planes: u8,
    pub flags: u8,
    pub ycbcr_enc: u8,
    pub quantization: u8,
    pub xfer_func: u8,
    pub reserved: [u8; 7],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union FormatUnion {
    pub pix_mp: PixFormatMplane,
    pub raw_data: [u8; 200],
    _align: [u64; 25],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Format {
    pub type_: u32,
    pub fmt: FormatUnion,
}

impl Format {
    pub fn mplane(type_: u32, pix_mp: PixFormatMplane) -> Self {
        let mut fmt = FormatUnion { raw_data: [0; 200] };
        fmt.pix_mp = pix_mp;
        Self { type_, fmt }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Crop {
    pub type_: u32,
    pub c: Rect,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Control {
    pub id: u32,
    pub value: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union PlaneMemory {
    pub mem_offset: u32,
    pub userptr: c_ulong,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: PlaneMemory,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            bytesused: 0,
            length: 0,
            m: PlaneMemory { userptr: 0 },
            data_offset: 0,
            reserved: [0; 11],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeval {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union BufferMemory {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut Plane,
    pub fd: i32,
}

/// `reserved` carries the acquire fence in and the release fence out
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: Timeval,
    pub timecode: Timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: BufferMemory,
    pub length: u32,
    pub reserved2: u32,
    pub reserved: i32,
}

impl Buffer {
    pub fn new(type_: u32, memory: u32) -> Self {
        Self {
            index: 0,
            type_,
            bytesused: 0,
            flags: 0,
            field: 0,
            timestamp: Timeval::default(),
            timecode: Timecode::default(),
            sequence: 0,
            memory,
            m: BufferMemory { userptr: 0 },
            length: 0,
            reserved2: 0,
            reserved: -1,
        }
    }
}

const QUERYCAP: Opcode = opcode::read::<Capability>(b'V', 0);
const S_FMT: Opcode = opcode::read_write::<Format>(b'V', 5);
const REQBUFS: Opcode = opcode::read_write::<RequestBuffers>(b'V', 8);
const QBUF: Opcode = opcode::read_write::<Buffer>(b'V', 15);
const DQBUF: Opcode = opcode::read_write::<Buffer>(b'V', 17);
const STREAMON: Opcode = opcode::write::<i32>(b'V', 18);
const STREAMOFF: Opcode = opcode::write::<i32>(b'V', 19);
const S_CTRL: Opcode = opcode::read_write::<Control>(b'V', 28);
const S_CROP: Opcode = opcode::write::<Crop>(b'V', 60);

pub fn query_capability(fd: impl AsFd) -> rustix::io::Result<Capability> {
    // SAFETY: QUERYCAP fills a `Capability`
    unsafe { ioctl::ioctl(fd, Getter::<QUERYCAP, Capability>::new()) }
}

pub fn set_format(fd: impl AsFd, format: &mut Format) -> rustix::io::Result<()> {
    // SAFETY: `Format` matches `struct v4l2_format`
    unsafe { ioctl::ioctl(fd, Updater::<S_FMT, Format>::new(format)) }
}

pub fn request_buffers(fd: impl AsFd, reqbufs: &mut RequestBuffers) -> rustix::io::Result<()> {
    // SAFETY: `RequestBuffers` matches `struct v4l2_requestbuffers`
    unsafe { ioctl::ioctl(fd, Updater::<REQBUFS, RequestBuffers>::new(reqbufs)) }
}

/// # Safety
///
/// `buffer.m.planes` must point to `buffer.length` planes whose memory handles
/// stay valid until the buffer is dequeued
pub unsafe fn queue_buffer(fd: impl AsFd, buffer: &mut Buffer) -> rustix::io::Result<()> {
    ioctl::ioctl(fd, Updater::<QBUF, Buffer>::new(buffer))
}

/// # Safety
///
/// `buffer.m.planes` must point to `buffer.length` writable planes
pub unsafe fn dequeue_buffer(fd: impl AsFd, buffer: &mut Buffer) -> rustix::io::Result<()> {
    ioctl::ioctl(fd, Updater::<DQBUF, Buffer>::new(buffer))
}

pub fn stream_on(fd: impl AsFd, type_: u32) -> rustix::io::Result<()> {
    // SAFETY: the buffer type is passed by pointer to int
    unsafe { ioctl::ioctl(fd, Setter::<STREAMON, i32>::new(type_ as i32)) }
}

pub fn stream_off(fd: impl AsFd, type_: u32) -> rustix::io::Result<()> {
    // SAFETY: the buffer type is passed by pointer to int
    unsafe { ioctl::ioctl(fd, Setter::<STREAMOFF, i32>::new(type_ as i32)) }
}

pub fn set_control(fd: impl AsFd, id: u32, value: i32) -> rustix::io::Result<()> {
    let mut control = Control { id, value };
    // SAFETY: `Control` matches `struct v4l2_control`
    unsafe { ioctl::ioctl(fd, Updater::<S_CTRL, Control>::new(&mut control)) }
}

pub fn set_crop(fd: impl AsFd, crop: &Crop) -> rustix::io::Result<()> {
    // SAFETY: `Crop` matches `struct v4l2_crop`
    unsafe { ioctl::ioctl(fd, Setter::<S_CROP, Crop>::new(*crop)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn layouts_match_the_kernel() {
        assert_eq!(size_of::<Capability>(), 104);
        assert_eq!(size_of::<PixFormatMplane>(), 192);
        assert_eq!(size_of::<Format>(), 208);
        assert_eq!(size_of::<RequestBuffers>(), 20);
        assert_eq!(size_of::<Crop>(), 20);
        assert_eq!(size_of::<Plane>(), 64);
        assert_eq!(size_of::<Buffer>(), 88);
    }

    #[test]
    fn fourcc_is_little_endian() {
        assert_eq!(fourcc(b"NV12"), 0x3231_564e);
    }
}
