//! the per-execution descriptor of the single-shot protocol
use bitflags::bitflags;
use blit_uapi::m2m1shot2 as uapi;
use std::{iter, os::fd::OwnedFd};

use crate::{
    canvas::{BufferHandle, Canvas, CanvasAttr, MemoryType},
    error::Result,
    geometry::{Rect, Transform},
    layer::BlendMode,
};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ImageFlags: u32 {
        const PREMUL_ALPHA = uapi::IMGFLAG_PREMUL_ALPHA;
        const GLOBAL_ALPHA = uapi::IMGFLAG_GLOBAL_ALPHA;
        const COLOR_FILL = uapi::IMGFLAG_COLORFILL;
        const ACQUIRE_FENCE = uapi::IMGFLAG_ACQUIRE_FENCE;
        const RELEASE_FENCE = uapi::IMGFLAG_RELEASE_FENCE;
        const SECURE = uapi::IMGFLAG_SECURE;
        const COMPRESSED = uapi::IMGFLAG_COMPRESSED;
        const UORDER = uapi::IMGFLAG_UORDER_ADDR;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct JobFlags: u32 {
        const NONBLOCK = uapi::FLAG_NONBLOCK;
        const ERROR = uapi::FLAG_ERROR;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPlane {
    pub handle: BufferHandle,
    pub offset: u32,
    pub length: u32,
    pub payload: u32,
}

#[derive(Debug, Default)]
pub struct JobImage {
    pub flags: ImageFlags,
    pub acquire: Option<OwnedFd>,
    pub release: Option<OwnedFd>,
    /// `None` for a color fill
    pub memory: Option<MemoryType>,
    pub planes: Vec<JobPlane>,
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    pub crop: Rect,
    pub window: Rect,
    pub fill_color: u32,
    pub transform: u16,
    pub blend: u16,
    pub alpha: u8,
    pub filter: u16,
    pub colorspace: u32,
}

impl JobImage {
    /// the whole of `canvas`, waiting on `acquire` when present
    pub fn from_canvas(canvas: &Canvas, acquire: Option<OwnedFd>) -> Self {
        let size = canvas.dimension();
        let format = canvas.format();
        let attr = canvas.attr();

        let mut flags = ImageFlags::empty();
        flags.set(ImageFlags::ACQUIRE_FENCE, acquire.is_some());
        flags.set(ImageFlags::COMPRESSED, attr.contains(CanvasAttr::COMPRESSED));
        flags.set(ImageFlags::SECURE, attr.contains(CanvasAttr::PROTECTED));
        flags.set(ImageFlags::UORDER, attr.contains(CanvasAttr::UORDER));

        let planes = canvas
            .planes()
            .iter()
            .map(|plane| JobPlane {
                handle: plane.handle,
                offset: plane.offset,
                length: plane.length,
                payload: plane.length,
            })
            .collect();

        Self {
            flags,
            acquire,
            memory: canvas.memory_type(),
            planes,
            width: size.hori,
            height: size.vert,
            fourcc: format.fourcc(),
            crop: Rect::from_size(size),
            window: Rect::from_size(size),
            colorspace: canvas.dataspace().v4l2_colorspace(size.hori, size.vert),
            ..Default::default()
        }
    }

    pub fn color_fill(argb: u32, canvas: &Canvas) -> Self {
        let size = canvas.dimension();
        Self {
            flags: ImageFlags::COLOR_FILL,
            width: size.hori,
            height: size.vert,
            fourcc: blit_uapi::v4l2::fourcc(b"AR24"),
            crop: Rect::from_size(size),
            window: Rect::from_size(size),
            fill_color: argb,
            blend: uapi::BLEND_SRC,
            alpha: u8::MAX,
            ..Default::default()
        }
    }
}

/// flips are named after the axis they mirror around
pub fn job_transform(transform: Transform) -> u16 {
    if transform == Transform::ROT_270 {
        return uapi::TRANSFORM_ROT270;
    }
    if transform == Transform::ROT_180 {
        return uapi::TRANSFORM_ROT180;
    }
    let mut bits = 0;
    if transform.contains(Transform::FLIP_H) {
        bits |= uapi::TRANSFORM_YFLIP;
    }
    if transform.contains(Transform::FLIP_V) {
        bits |= uapi::TRANSFORM_XFLIP;
    }
    if transform.contains(Transform::ROT_90) {
        bits |= uapi::TRANSFORM_ROT90;
    }
    bits
}

pub fn job_blend(blend: BlendMode) -> u16 {
    match blend {
        BlendMode::Premultiplied => uapi::BLEND_SRCOVER,
        BlendMode::Coverage => uapi::BLEND_NONE,
        BlendMode::None => uapi::BLEND_SRC,
    }
}

#[derive(Debug, Default)]
pub struct Job {
    pub target: JobImage,
    pub sources: Vec<JobImage>,
    pub flags: JobFlags,
}

impl Job {
    /// start a new job for `sources` images, growing the source array if needed
    pub fn reset(&mut self, sources: usize) -> Result<()> {
        self.target = JobImage::default();
        self.sources.clear();
        self.sources.try_reserve(sources)?;
        self.flags = JobFlags::empty();
        Ok(())
    }

    /// capacity reached so far, it never shrinks
    pub fn capacity(&self) -> usize {
        self.sources.capacity()
    }

    pub fn images(&self) -> impl Iterator<Item = &JobImage> {
        iter::once(&self.target).chain(&self.sources)
    }

    pub fn images_mut(&mut self) -> impl Iterator<Item = &mut JobImage> {
        iter::once(&mut self.target).chain(&mut self.sources)
    }

    /// release fences in submission order, target first
    pub fn take_release_fences(&mut self) -> impl Iterator<Item = OwnedFd> + '_ {
        self.images_mut().filter_map(|image| image.release.take())
    }

    pub fn drop_acquire_fences(&mut self) {
        self.images_mut().for_each(|image| image.acquire = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transforms_map_to_driver_bits() {
        assert_eq!(job_transform(Transform::empty()), 0);
        assert_eq!(job_transform(Transform::ROT_180), uapi::TRANSFORM_ROT180);
        assert_eq!(job_transform(Transform::ROT_270), uapi::TRANSFORM_ROT270);
        assert_eq!(job_transform(Transform::FLIP_H), uapi::TRANSFORM_YFLIP);
        assert_eq!(
            job_transform(Transform::FLIP_V | Transform::ROT_90),
            uapi::TRANSFORM_XFLIP | uapi::TRANSFORM_ROT90
        );
    }

    #[test]
    fn source_capacity_is_a_high_water_mark() {
        let mut job = Job::default();
        job.reset(8).unwrap();
        let grown = job.capacity();
        assert!(grown >= 8);
        job.reset(2).unwrap();
        assert_eq!(job.capacity(), grown);
    }
}
