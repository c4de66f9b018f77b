//! pixel format metadata
use blit_uapi::v4l2::fourcc;

/// horizontal and vertical chroma subsampling factors
///
/// ordering compares the horizontal factor first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChromaSubsampling {
    pub hori: u8,
    pub vert: u8,
}

impl ChromaSubsampling {
    pub const NONE: Self = Self { hori: 1, vert: 1 };
    pub const YUV422: Self = Self { hori: 2, vert: 1 };
    pub const YUV420: Self = Self { hori: 2, vert: 2 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8888,
    Bgra8888,
    Rgbx8888,
    Rgb888,
    Rgb565,
    Rgba1010102,
    Nv12,
    Nv12M,
    Nv12MS10b,
    Nv21,
    Nv21M,
    P010,
    P010M,
    Yuyv,
    Yvyu,
    Nv16,
    Yv12,
    I420M,
}

impl PixelFormat {
    pub const fn bits_per_pixel(self) -> u32 {
        use PixelFormat::*;
        match self {
            Rgba8888 | Bgra8888 | Rgbx8888 | Rgba1010102 => 32,
            Rgb888 => 24,
            Rgb565 | Yuyv | Yvyu | Nv16 => 16,
            Nv12 | Nv12M | Nv21 | Nv21M | Yv12 | I420M => 12,
            Nv12MS10b => 15,
            P010 | P010M => 24,
        }
    }

    /// number of separate buffers the format is spread over
    pub const fn buffer_count(self) -> usize {
        use PixelFormat::*;
        match self {
            Nv12M | Nv21M | Nv12MS10b | P010M => 2,
            I420M => 3,
            _ => 1,
        }
    }

    /// number of color planes regardless of how they are stored
    pub const fn plane_count(self) -> usize {
        use PixelFormat::*;
        match self {
            Rgba8888 | Bgra8888 | Rgbx8888 | Rgb888 | Rgb565 | Rgba1010102 | Yuyv | Yvyu => 1,
            Nv12 | Nv12M | Nv12MS10b | Nv21 | Nv21M | P010 | P010M | Nv16 => 2,
            Yv12 | I420M => 3,
        }
    }

    pub const fn chroma_subsampling(self) -> ChromaSubsampling {
        use PixelFormat::*;
        match self {
            Rgba8888 | Bgra8888 | Rgbx8888 | Rgb888 | Rgb565 | Rgba1010102 => ChromaSubsampling::NONE,
            Yuyv | Yvyu | Nv16 => ChromaSubsampling::YUV422,
            _ => ChromaSubsampling::YUV420,
        }
    }

    pub const fn is_yuv(self) -> bool {
        !matches!(
            self,
            Self::Rgba8888 | Self::Bgra8888 | Self::Rgbx8888 | Self::Rgb888 | Self::Rgb565 | Self::Rgba1010102
        )
    }

    pub const fn fourcc(self) -> u32 {
        use PixelFormat::*;
        match self {
            Rgba8888 => fourcc(b"AB24"),
            Bgra8888 => fourcc(b"AR24"),
            Rgbx8888 => fourcc(b"XB24"),
            Rgb888 => fourcc(b"RGB3"),
            Rgb565 => fourcc(b"RGBP"),
            Rgba1010102 => fourcc(b"AB30"),
            Nv12 => fourcc(b"NV12"),
            Nv12M => fourcc(b"NM12"),
            Nv12MS10b => fourcc(b"BM12"),
            Nv21 => fourcc(b"NV21"),
            Nv21M => fourcc(b"NM21"),
            P010 => fourcc(b"P010"),
            P010M => fourcc(b"PM12"),
            Yuyv => fourcc(b"YUYV"),
            Yvyu => fourcc(b"YVYU"),
            Nv16 => fourcc(b"NV16"),
            Yv12 => fourcc(b"YV12"),
            I420M => fourcc(b"YM12"),
        }
    }

    /// byte length of buffer `index` for an image of `width` x `height`
    ///
    /// returns 0 for an index the format does not have, saturates at `u32::MAX`
    pub const fn plane_length(self, index: usize, width: u32, height: u32) -> u32 {
        use PixelFormat::*;
        let luma = width as u64 * height as u64;
        let len = match (self, index) {
            (Nv12M | Nv21M, 0) | (I420M, 0) => luma,
            (Nv12M | Nv21M, 1) => luma / 2,
            (I420M, 1 | 2) => luma / 4,
            (Nv12MS10b, 0) => luma + luma / 4,
            (Nv12MS10b, 1) => (luma + luma / 4) / 2,
            (P010M, 0) => luma * 2,
            (P010M, 1) => luma,
            (_, 0) if self.buffer_count() == 1 => luma * self.bits_per_pixel() as u64 / 8,
            _ => 0,
        };
        if len > u32::MAX as u64 { u32::MAX } else { len as u32 }
    }

    /// the single buffer format with the same memory layout semantics
    pub const fn single_buffer_equivalent(self) -> Self {
        use PixelFormat::*;
        match self {
            Nv12M => Nv12,
            Nv21M => Nv21,
            Nv12MS10b | P010M => P010,
            I420M => Yv12,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_lengths() {
        assert_eq!(PixelFormat::Rgba8888.plane_length(0, 1920, 1080), 1920 * 1080 * 4);
        assert_eq!(PixelFormat::Nv12.plane_length(0, 16, 16), 384);
        assert_eq!(PixelFormat::Nv12M.plane_length(1, 16, 16), 128);
        assert_eq!(PixelFormat::Nv12.plane_length(1, 16, 16), 0);
        assert_eq!(PixelFormat::Rgb888.plane_length(0, 3, 1), 9);
    }

    #[test]
    fn oversized_planes_saturate() {
        assert_eq!(PixelFormat::Rgba8888.plane_length(0, 70000, 70000), u32::MAX);
        assert_eq!(PixelFormat::P010M.plane_length(0, 65536, 65536), u32::MAX);
        assert_eq!(PixelFormat::Nv12M.plane_length(1, 65536, 65536), 1 << 31);
    }

    #[test]
    fn equivalents_use_one_buffer() {
        for format in [PixelFormat::Nv12M, PixelFormat::Nv21M, PixelFormat::I420M, PixelFormat::P010M] {
            assert_eq!(format.single_buffer_equivalent().buffer_count(), 1);
        }
    }

    #[test]
    fn subsampling_orders_horizontal_first() {
        assert!(ChromaSubsampling::YUV420 > ChromaSubsampling::YUV422);
        assert!(ChromaSubsampling::YUV422 > ChromaSubsampling::NONE);
    }
}
