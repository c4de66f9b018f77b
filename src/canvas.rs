//! description of one image buffer
use bitflags::bitflags;
use std::os::fd::{OwnedFd, RawFd};

use crate::{
    dataspace::Dataspace,
    error::{Error, Image, Result},
    format::PixelFormat,
    geometry::Coord,
};

pub const MAX_PLANES: usize = 4;

bitflags! {
    /// settings changed since the last successful execution
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Modified: u32 {
        const TYPE = 1 << 0;
        const DIMENSION = 1 << 1;
        const BUFFER = 1 << 2;
        const COMPOSITION = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CanvasAttr: u32 {
        /// content must only be accessed by secure hardware paths
        const PROTECTED = 1 << 0;
        /// afbc compressed
        const COMPRESSED = 1 << 1;
        /// written in u-order
        const UORDER = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Dmabuf,
    UserPtr,
}

/// borrowed for the duration of an execution, never closed or freed here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHandle {
    Dmabuf(RawFd),
    UserPtr(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plane {
    pub handle: BufferHandle,
    pub offset: u32,
    pub length: u32,
}

impl Plane {
    pub const fn dmabuf(fd: RawFd, offset: u32, length: u32) -> Self {
        Self { handle: BufferHandle::Dmabuf(fd), offset, length }
    }

    pub const fn userptr(addr: usize, length: u32) -> Self {
        Self { handle: BufferHandle::UserPtr(addr), offset: 0, length }
    }

    pub const fn memory_type(&self) -> MemoryType {
        match self.handle {
            BufferHandle::Dmabuf(_) => MemoryType::Dmabuf,
            BufferHandle::UserPtr(_) => MemoryType::UserPtr,
        }
    }
}

#[derive(Debug)]
pub struct Canvas {
    image: Image,
    format: PixelFormat,
    dataspace: Dataspace,
    dimension: Coord,
    planes: Vec<Plane>,
    fence: Option<OwnedFd>,
    attr: CanvasAttr,
    modified: Modified,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(Image::Target)
    }
}

impl Canvas {
    pub(crate) fn new(image: Image) -> Self {
        Self {
            image,
            format: PixelFormat::Rgba8888,
            dataspace: Dataspace::UNKNOWN,
            dimension: Coord::default(),
            planes: Vec::with_capacity(MAX_PLANES),
            fence: None,
            attr: CanvasAttr::empty(),
            modified: Modified::all(),
        }
    }

    pub fn image(&self) -> Image {
        self.image
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn dataspace(&self) -> Dataspace {
        self.dataspace
    }

    pub fn dimension(&self) -> Coord {
        self.dimension
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn memory_type(&self) -> Option<MemoryType> {
        self.planes.first().map(Plane::memory_type)
    }

    pub fn fence(&self) -> Option<&OwnedFd> {
        self.fence.as_ref()
    }

    pub fn attr(&self) -> CanvasAttr {
        self.attr
    }

    pub fn is_protected(&self) -> bool {
        self.attr.contains(CanvasAttr::PROTECTED)
    }

    pub fn modified(&self) -> Modified {
        self.modified
    }

    pub fn set_dimension(&mut self, width: u32, height: u32) {
        let dimension = Coord::new(width, height);
        if self.dimension != dimension {
            self.dimension = dimension;
            self.modified |= Modified::DIMENSION;
        }
    }

    pub fn set_image_type(&mut self, format: PixelFormat, dataspace: Dataspace) {
        if self.format != format || self.dataspace != dataspace {
            self.format = format;
            self.dataspace = dataspace;
            self.modified |= Modified::TYPE;
        }
    }

    /// replace the buffer planes, all planes must share one memory type
    ///
    /// `fence` is an acquire fence the engine waits on before reading or
    /// writing the buffer, it is consumed by the next execution
    pub fn set_buffer(&mut self, planes: &[Plane], fence: Option<OwnedFd>, attr: CanvasAttr) -> Result<()> {
        let Some(first) = planes.first() else {
            return Err(Error::NoBuffer { image: self.image });
        };
        if planes.len() > MAX_PLANES {
            return Err(Error::BufferCount {
                image: self.image,
                format: self.format,
                required: self.format.buffer_count(),
                configured: planes.len(),
            });
        }
        if planes.iter().any(|plane| plane.memory_type() != first.memory_type()) {
            return Err(Error::Unsupported { image: self.image, feature: "mixed buffer memory types" });
        }

        self.planes.clear();
        self.planes.extend_from_slice(planes);
        self.fence = fence;
        self.attr = attr;
        self.modified |= Modified::BUFFER;
        Ok(())
    }

    pub fn set_fence(&mut self, fence: Option<OwnedFd>) {
        self.fence = fence;
    }

    pub(crate) fn take_fence(&mut self) -> Option<OwnedFd> {
        self.fence.take()
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified = Modified::empty();
    }

    pub(crate) fn mark_modified(&mut self, flags: Modified) {
        self.modified |= flags;
    }

    /// copy everything describing the image, except the fence and modified marker
    pub(crate) fn copy_image_from(&mut self, other: &Canvas) {
        self.set_dimension(other.dimension.hori, other.dimension.vert);
        self.set_image_type(other.format, other.dataspace);
        if self.planes != other.planes || self.attr != other.attr {
            self.planes.clone_from(&other.planes);
            self.attr = other.attr;
            self.modified |= Modified::BUFFER;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_mark_only_on_change() {
        let mut canvas = Canvas::default();
        canvas.clear_modified();
        canvas.set_dimension(0, 0);
        assert!(canvas.modified().is_empty());
        canvas.set_dimension(64, 32);
        assert_eq!(canvas.modified(), Modified::DIMENSION);
        canvas.set_image_type(PixelFormat::Nv12, Dataspace::LEGACY_BT709);
        assert_eq!(canvas.modified(), Modified::DIMENSION | Modified::TYPE);
    }

    #[test]
    fn buffer_planes_are_validated() {
        let mut canvas = Canvas::default();
        assert!(canvas.set_buffer(&[], None, CanvasAttr::empty()).is_err());
        let mixed = [Plane::dmabuf(3, 0, 16), Plane::userptr(0x1000, 16)];
        assert!(canvas.set_buffer(&mixed, None, CanvasAttr::empty()).is_err());
        let five = [Plane::dmabuf(3, 0, 16); 5];
        assert!(canvas.set_buffer(&five, None, CanvasAttr::empty()).is_err());

        canvas.set_buffer(&[Plane::userptr(0x1000, 64)], None, CanvasAttr::PROTECTED).unwrap();
        assert_eq!(canvas.memory_type(), Some(MemoryType::UserPtr));
        assert!(canvas.is_protected());
    }
}
