//! single-shot job protocol of the fimg2d engine
//!
//! one target image and up to [`MAX_IMAGES`] source images are submitted with
//! [`process`], a non-blocking submission is completed with [`wait_process`]
use rustix::{
    fd::AsFd,
    ioctl::{self, opcode, Opcode, Setter, Updater},
};
use std::{ffi::c_ulong, ptr};

pub const MAX_PLANES: usize = 4;
pub const MAX_IMAGES: usize = 16;
pub const PERF_MAX_FRAMES: usize = 4;

pub const IMGFLAG_PREMUL_ALPHA: u32 = 1 << 0;
pub const IMGFLAG_GLOBAL_ALPHA: u32 = 1 << 1;
pub const IMGFLAG_COLORFILL: u32 = 1 << 2;
pub const IMGFLAG_ACQUIRE_FENCE: u32 = 1 << 3;
pub const IMGFLAG_RELEASE_FENCE: u32 = 1 << 4;
pub const IMGFLAG_SECURE: u32 = 1 << 5;
pub const IMGFLAG_COMPRESSED: u32 = 1 << 6;
pub const IMGFLAG_UORDER_ADDR: u32 = 1 << 7;

pub const BUFTYPE_NONE: u8 = 0;
pub const BUFTYPE_EMPTY: u8 = 1;
pub const BUFTYPE_DMABUF: u8 = 2;
pub const BUFTYPE_USERPTR: u8 = 3;

pub const FLAG_NONBLOCK: u32 = 1 << 0;
pub const FLAG_ERROR: u32 = 1 << 1;

pub const TRANSFORM_ROT90: u16 = 1;
pub const TRANSFORM_ROT180: u16 = 2;
pub const TRANSFORM_ROT270: u16 = 3;
pub const TRANSFORM_XFLIP: u16 = 1 << 2;
pub const TRANSFORM_YFLIP: u16 = 1 << 3;

pub const BLEND_NONE: u16 = 0;
pub const BLEND_SRC: u16 = 1;
pub const BLEND_SRCOVER: u16 = 2;

pub const SCALER_FILTER_DEFAULT: u16 = 0;
pub const SCALER_FILTER_BILINEAR: u16 = 1;

pub const PRIORITY_LOW: i32 = 0;
pub const PRIORITY_MEDIUM: i32 = 1;
pub const PRIORITY_HIGH: i32 = 2;
pub const PRIORITY_HIGHEST: i32 = 3;
pub const PRIORITY_DEFAULT: i32 = PRIORITY_MEDIUM;

pub const PERF_LAYER_ROTATE: u32 = 1 << 0;
pub const PERF_FRAME_SOLIDCOLORFILL: u32 = 1 << 0;

#[repr(C)]
#[derive(Clone, Copy)]
pub union BufferHandle {
    pub userptr: c_ulong,
    pub fd: i32,
}

impl Default for BufferHandle {
    fn default() -> Self {
        Self { userptr: 0 }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Buffer {
    pub m: BufferHandle,
    pub offset: u32,
    pub length: u32,
    pub payload: u32,
    pub reserved: c_ulong,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub width: u16,
    pub height: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub crop: Rect,
    pub window: Rect,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Extra {
    pub fillcolor: u32,
    pub transform: u16,
    pub composit_mode: u16,
    pub galpha_red: u8,
    pub galpha_green: u8,
    pub galpha_blue: u8,
    pub galpha: u8,
    pub xrepeat: u16,
    pub yrepeat: u16,
    pub scaler_filter: u16,
    pub reserved: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Image {
    pub flags: u32,
    pub fence: i32,
    pub memory: u8,
    pub num_planes: u8,
    pub reserved: u16,
    pub plane: [Buffer; MAX_PLANES],
    pub fmt: Format,
    pub ext: Extra,
    pub colorspace: u32,
}

#[repr(C)]
pub struct Job {
    pub target: Image,
    pub sources: *mut Image,
    pub flags: u32,
    pub num_sources: u8,
    pub reserved1: u8,
    pub reserved2: u16,
    pub work_delay_in_nsec: u64,
    pub reserved4: c_ulong,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            target: Image::default(),
            sources: ptr::null_mut(),
            flags: 0,
            num_sources: 0,
            reserved1: 0,
            reserved2: 0,
            work_delay_in_nsec: 0,
            reserved4: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfLayer {
    pub pixelcount: u32,
    pub layer_attr: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfFrame {
    pub layer: [PerfLayer; MAX_IMAGES],
    pub num_layers: u32,
    pub frame_rate: u32,
    pub bandwidth_read: u32,
    pub bandwidth_write: u32,
    pub target_pixelcount: u32,
    pub frame_attr: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfData {
    pub num_frames: u32,
    pub reserved: u32,
    pub frame: [PerfFrame; PERF_MAX_FRAMES],
}

const PROCESS: Opcode = opcode::read_write::<Job>(b'M', 4);
const WAIT_PROCESS: Opcode = opcode::read::<Job>(b'M', 5);
const SET_PRIORITY: Opcode = opcode::write::<i32>(b'M', 6);
const REQUEST_PERF: Opcode = opcode::write::<PerfData>(b'M', 7);

/// submit `job`, the kernel writes release fences and error flags back into it
///
/// # Safety
///
/// `job.sources` must point to `job.num_sources` initialized images and every
/// buffer handle and acquire fence must stay open for the duration of the call
pub unsafe fn process(fd: impl AsFd, job: &mut Job) -> rustix::io::Result<()> {
    ioctl::ioctl(fd, Updater::<PROCESS, Job>::new(job))
}

/// block until the last job submitted on `fd` completes
///
/// # Safety
///
/// same requirements as [`process`], `job` must be the descriptor last submitted
pub unsafe fn wait_process(fd: impl AsFd, job: &mut Job) -> rustix::io::Result<()> {
    ioctl::ioctl(fd, Updater::<WAIT_PROCESS, Job>::new(job))
}

pub fn set_priority(fd: impl AsFd, priority: i32) -> rustix::io::Result<()> {
    // SAFETY: the argument is a plain integer read by the kernel
    unsafe { ioctl::ioctl(fd, Setter::<SET_PRIORITY, i32>::new(priority)) }
}

pub fn request_performance(fd: impl AsFd, data: &PerfData) -> rustix::io::Result<()> {
    // SAFETY: `PerfData` is plain data without pointers
    unsafe { ioctl::ioctl(fd, Setter::<REQUEST_PERF, PerfData>::new(*data)) }
}
