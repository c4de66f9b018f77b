use crate::{
    dataspace::Dataspace,
    format::PixelFormat,
    geometry::{Coord, Rect},
    layer::LayerId,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// which image of a job an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Image {
    Target,
    Source(LayerId),
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Image::Target => f.write_str("target"),
            Image::Source(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{image}: format {format:?} is not supported")]
    UnsupportedFormat { image: Image, format: PixelFormat },
    #[error("{image}: dataspace {dataspace} is not supported")]
    UnsupportedDataspace { image: Image, dataspace: Dataspace },
    #[error("{image}: {feature} is not supported")]
    Unsupported { image: Image, feature: &'static str },
    #[error("{image}: dimension {size} is out of range")]
    InvalidDimension { image: Image, size: Coord },
    #[error("{image}: {rect} does not fit in {size}")]
    InvalidRect { image: Image, rect: Rect, size: Coord },
    #[error("{image}: {what} is not aligned")]
    Misaligned { image: Image, what: &'static str },
    #[error("{image}: no buffer configured")]
    NoBuffer { image: Image },
    #[error("{image}: {format:?} requires {required} buffers, {configured} configured")]
    BufferCount { image: Image, format: PixelFormat, required: usize, configured: usize },
    #[error("{image}: cannot scale {src} to {dst}")]
    ScaleOutOfRange { image: Image, src: Coord, dst: Coord },
    #[error("{count} layers exceed the limit of {max}")]
    TooManyLayers { count: usize, max: u32 },
    #[error("{count} layers given, the engine composes exactly {required}")]
    LayerCount { count: usize, required: usize },
    #[error("{0} not found")]
    LayerNotFound(LayerId),
    #[error("invalid priority {0}")]
    InvalidPriority(i32),
    #[error("invalid performance request: {0}")]
    InvalidRequest(&'static str),
    #[error("unknown hardware spec {0:?}")]
    UnknownSpec(String),

    #[error("out of memory")]
    OutOfMemory,
    #[error("failed to allocate {len} bytes: {source}")]
    Allocation { len: u32, source: std::io::Error },

    #[error("device busy")]
    Busy,
    #[error("device reported a processing error")]
    Processing,
    #[error("{op} failed: {source}")]
    Device { op: &'static str, source: std::io::Error },
}

impl Error {
    pub(crate) fn device(op: &'static str, errno: rustix::io::Errno) -> Self {
        if errno == rustix::io::Errno::BUSY {
            return Self::Busy;
        }
        Self::Device { op, source: errno.into() }
    }

    /// the caller may retry after reconfiguring fences
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
