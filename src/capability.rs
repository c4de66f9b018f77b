//! immutable hardware limits of each engine variant
use bitflags::bitflags;

use crate::{
    dataspace::{Dataspace, ALL_DATASPACES, SRGB_DATASPACES},
    format::PixelFormat,
    geometry::{Coord, Rect, Transform},
    layer::BlendMode,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompositingModes: u32 {
        const NONE = 1 << 0;
        const SRC_COPY = 1 << 1;
        const SRC_OVER = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u32 {
        const PLANE_ALPHA = 1 << 0;
        const UORDER_WRITE = 1 << 1;
        const AFBC_ENCODE = 1 << 2;
        const AFBC_DECODE = 1 << 3;
        const OTF_WRITE = 1 << 4;
        const SOLID_COLOR = 1 << 5;
    }
}

#[derive(Debug)]
pub struct Capability {
    /// largest magnification per axis
    pub max_upsampling: Coord,
    /// largest minification per axis
    pub max_downsampling: Coord,
    /// largest magnification available to resizing without filtering
    pub max_upsizing: Coord,
    pub max_downsizing: Coord,
    pub min_src_dimension: Coord,
    pub max_src_dimension: Coord,
    pub min_dst_dimension: Coord,
    pub max_dst_dimension: Coord,
    pub min_pix_align: Coord,
    /// number of extra resampling stages the engine may chain
    pub rescaling_count: u32,
    pub compositing_modes: CompositingModes,
    pub transforms: Transform,
    pub features: Features,
    pub max_layers: u32,
    pub formats: &'static [PixelFormat],
    /// preference ordered
    pub dataspaces: &'static [Dataspace],
    pub base_align: u32,
}

impl Capability {
    pub fn supports_format(&self, format: PixelFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn supports_dataspace(&self, dataspace: Dataspace) -> bool {
        self.dataspaces.contains(&dataspace.without_transfer())
    }

    pub fn supports_transform(&self, transform: Transform) -> bool {
        self.transforms.contains(transform)
    }

    pub fn supports_feature(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    pub fn supports_blend(&self, blend: BlendMode) -> bool {
        self.compositing_modes.contains(blend.compositing_mode())
    }

    pub fn supports_src_dimension(&self, size: Coord) -> bool {
        size.within(self.min_src_dimension, self.max_src_dimension)
    }

    pub fn supports_dst_dimension(&self, size: Coord) -> bool {
        size.within(self.min_dst_dimension, self.max_dst_dimension)
    }

    pub fn is_aligned(&self, rect: Rect) -> bool {
        let align = self.min_pix_align;
        rect.pos.hori % align.hori == 0
            && rect.pos.vert % align.vert == 0
            && rect.size.hori % align.hori == 0
            && rect.size.vert % align.vert == 0
    }

    /// whether a single stage can scale `src` to `dst` with filtering
    ///
    /// `dst` is the size on the output, so it is swapped back when `transform` rotates
    pub fn supports_resampling(&self, src: Coord, dst: Coord, transform: Transform) -> bool {
        let dst = transform.to_source_orientation(dst);
        ratio_within(src, dst, self.max_upsampling, self.max_downsampling)
    }

    pub fn supports_resizing(&self, src: Coord, dst: Coord, transform: Transform) -> bool {
        let dst = transform.to_source_orientation(dst);
        ratio_within(src, dst, self.max_upsizing, self.max_downsizing)
    }

    /// whether scale ratios beyond [`Capability::supports_resampling`] can be reached by prescaling
    pub fn can_prescale(&self) -> bool {
        self.rescaling_count > 0
    }
}

fn ratio_within(src: Coord, dst: Coord, up: Coord, down: Coord) -> bool {
    let axis = |src: u32, dst: u32, up: u32, down: u32| {
        let (src, dst) = (src as u64, dst as u64);
        src * up as u64 >= dst && src <= dst * down as u64
    };
    axis(src.hori, dst.hori, up.hori, down.hori) && axis(src.vert, dst.vert, up.vert, down.vert)
}

const UNLIMITED: Coord = Coord::new(32767, 32767);
const ALL_MODES: CompositingModes = CompositingModes::all();

pub const RGB_FORMATS: &[PixelFormat] = &[
    PixelFormat::Rgba8888,
    PixelFormat::Bgra8888,
    PixelFormat::Rgbx8888,
    PixelFormat::Rgb888,
    PixelFormat::Rgb565,
];

pub const G2D_FORMATS: &[PixelFormat] = &[
    PixelFormat::Rgba8888,
    PixelFormat::Bgra8888,
    PixelFormat::Rgbx8888,
    PixelFormat::Rgb888,
    PixelFormat::Rgb565,
    PixelFormat::Nv21,
    PixelFormat::Nv21M,
    PixelFormat::Nv12,
    PixelFormat::Nv12M,
    PixelFormat::Nv12MS10b,
    PixelFormat::Yuyv,
    PixelFormat::Yvyu,
    PixelFormat::Nv16,
];

pub const G2D_HDR_FORMATS: &[PixelFormat] = &[
    PixelFormat::Rgba8888,
    PixelFormat::Bgra8888,
    PixelFormat::Rgbx8888,
    PixelFormat::Rgb888,
    PixelFormat::Rgb565,
    PixelFormat::Rgba1010102,
    PixelFormat::Nv21,
    PixelFormat::Nv21M,
    PixelFormat::Nv12,
    PixelFormat::Nv12M,
    PixelFormat::Nv12MS10b,
    PixelFormat::P010,
    PixelFormat::P010M,
    PixelFormat::Yuyv,
    PixelFormat::Yvyu,
    PixelFormat::Nv16,
];

pub const SCALER_FORMATS: &[PixelFormat] = &[
    PixelFormat::Rgba8888,
    PixelFormat::Bgra8888,
    PixelFormat::Rgbx8888,
    PixelFormat::Rgb888,
    PixelFormat::Rgb565,
    PixelFormat::Nv21,
    PixelFormat::Nv21M,
    PixelFormat::Nv12,
    PixelFormat::Nv12M,
    PixelFormat::Nv12MS10b,
    PixelFormat::Yuyv,
    PixelFormat::Yvyu,
    PixelFormat::Nv16,
    PixelFormat::Yv12,
    PixelFormat::I420M,
];

/// fimg2d with one chained resampling stage and afbc
pub static G2D_8895: Capability = Capability {
    max_upsampling: UNLIMITED,
    max_downsampling: Coord::new(2, 2),
    max_upsizing: UNLIMITED,
    max_downsizing: UNLIMITED,
    min_src_dimension: Coord::new(1, 1),
    max_src_dimension: Coord::new(8192, 8192),
    min_dst_dimension: Coord::new(1, 1),
    max_dst_dimension: Coord::new(8192, 8192),
    min_pix_align: Coord::new(1, 1),
    rescaling_count: 1,
    compositing_modes: ALL_MODES,
    transforms: Transform::all(),
    features: Features::PLANE_ALPHA
        .union(Features::UORDER_WRITE)
        .union(Features::AFBC_ENCODE)
        .union(Features::AFBC_DECODE),
    max_layers: 8,
    formats: G2D_FORMATS,
    dataspaces: &ALL_DATASPACES,
    base_align: 1,
};

pub static G2D_8890: Capability = Capability {
    max_upsampling: UNLIMITED,
    max_downsampling: Coord::new(2, 2),
    max_upsizing: UNLIMITED,
    max_downsizing: UNLIMITED,
    min_src_dimension: Coord::new(4, 4),
    max_src_dimension: Coord::new(8192, 8192),
    min_dst_dimension: Coord::new(4, 4),
    max_dst_dimension: Coord::new(8192, 8192),
    min_pix_align: Coord::new(1, 1),
    rescaling_count: 1,
    compositing_modes: ALL_MODES,
    transforms: Transform::all(),
    features: Features::PLANE_ALPHA.union(Features::AFBC_DECODE),
    max_layers: 3,
    formats: RGB_FORMATS,
    dataspaces: &SRGB_DATASPACES,
    base_align: 1,
};

pub static G2D_9610: Capability = G2D_9610_BASE;

pub static G2D_9810: Capability = Capability { max_layers: 16, ..G2D_9610_BASE };

const G2D_9610_BASE: Capability = Capability {
    max_upsampling: UNLIMITED,
    max_downsampling: UNLIMITED,
    max_upsizing: UNLIMITED,
    max_downsizing: UNLIMITED,
    min_src_dimension: Coord::new(1, 1),
    max_src_dimension: Coord::new(8192, 8192),
    min_dst_dimension: Coord::new(1, 1),
    max_dst_dimension: Coord::new(8192, 8192),
    min_pix_align: Coord::new(1, 1),
    rescaling_count: 0,
    compositing_modes: ALL_MODES,
    transforms: Transform::all(),
    features: Features::PLANE_ALPHA
        .union(Features::UORDER_WRITE)
        .union(Features::AFBC_ENCODE)
        .union(Features::AFBC_DECODE)
        .union(Features::OTF_WRITE),
    max_layers: 8,
    formats: G2D_HDR_FORMATS,
    dataspaces: &ALL_DATASPACES,
    base_align: 1,
};

/// two layer blitter without afbc, srgb only
pub static G2D_9810_BLTER: Capability = Capability {
    features: Features::PLANE_ALPHA.union(Features::UORDER_WRITE),
    max_layers: 2,
    formats: RGB_FORMATS,
    dataspaces: &SRGB_DATASPACES,
    ..G2D_9610_BASE
};

pub static G2D_L16FSBWC: Capability = Capability {
    features: G2D_9610_BASE.features.union(Features::SOLID_COLOR),
    max_layers: 16,
    ..G2D_9610_BASE
};

pub static G2D_L8FSBWCL: Capability = Capability {
    features: G2D_9610_BASE.features.union(Features::SOLID_COLOR),
    ..G2D_9610_BASE
};

/// single layer mem2mem scaler
pub static MSCL_9810: Capability = Capability {
    max_upsampling: Coord::new(64, 64),
    max_downsampling: Coord::new(16, 16),
    max_upsizing: Coord::new(64, 64),
    max_downsizing: Coord::new(16, 16),
    min_src_dimension: Coord::new(16, 16),
    max_src_dimension: Coord::new(8192, 8192),
    min_dst_dimension: Coord::new(4, 4),
    max_dst_dimension: Coord::new(8192, 8192),
    min_pix_align: Coord::new(1, 1),
    rescaling_count: 0,
    compositing_modes: ALL_MODES,
    transforms: Transform::all(),
    features: Features::empty(),
    max_layers: 1,
    formats: SCALER_FORMATS,
    dataspaces: &ALL_DATASPACES,
    base_align: 4,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> [&'static Capability; 9] {
        [
            &G2D_8890,
            &G2D_8895,
            &G2D_9610,
            &G2D_9810,
            &G2D_9810_BLTER,
            &G2D_L16FSBWC,
            &G2D_L8FSBWCL,
            &MSCL_9810,
            &crate::backend::dummy::DUMMY,
        ]
    }

    #[test]
    fn dimension_ranges_are_ordered() {
        for cap in all() {
            assert!(cap.min_src_dimension.within(Coord::new(1, 1), cap.max_src_dimension));
            assert!(cap.min_dst_dimension.within(Coord::new(1, 1), cap.max_dst_dimension));
            assert!(cap.max_layers >= 1);
            assert!(!cap.formats.is_empty());
            assert!(!cap.dataspaces.is_empty());
            assert!(cap.base_align.is_power_of_two());
        }
    }

    #[test]
    fn tables_have_no_duplicates() {
        for cap in all() {
            for (i, format) in cap.formats.iter().enumerate() {
                assert!(!cap.formats[i + 1..].contains(format), "{format:?} listed twice");
            }
            for (i, ds) in cap.dataspaces.iter().enumerate() {
                assert!(!cap.dataspaces[i + 1..].contains(ds), "{ds:?} listed twice");
            }
        }
    }

    #[test]
    fn resampling_accounts_for_rotation() {
        let cap = &MSCL_9810;
        let src = Coord::new(1600, 100);
        let dst = Coord::new(100, 100);
        assert!(cap.supports_resampling(src, dst, Transform::empty()));
        assert!(cap.supports_resampling(src, Coord::new(100, 1600), Transform::empty()));
        assert!(!cap.supports_resampling(src, Coord::new(100, 6401), Transform::empty()));
        assert!(cap.supports_resampling(src, Coord::new(100, 6401), Transform::ROT_90));
        assert!(!cap.supports_resampling(Coord::new(1700, 100), dst, Transform::empty()));
    }

    #[test]
    fn unlimited_is_the_largest_i16() {
        assert_eq!(G2D_9610.max_downsampling, Coord::new(32767, 32767));
        assert_eq!(G2D_9810.max_upsizing, Coord::new(i16::MAX as u32, i16::MAX as u32));
    }

    #[test]
    fn downscale_limit_of_two() {
        let cap = &G2D_8895;
        assert!(cap.supports_resampling(Coord::new(200, 200), Coord::new(100, 100), Transform::empty()));
        assert!(!cap.supports_resampling(Coord::new(201, 200), Coord::new(100, 100), Transform::empty()));
        assert!(cap.can_prescale());
    }
}
