//! color standard and range tags attached to buffers
use blit_uapi::v4l2;

const STANDARD_SHIFT: u32 = 16;
const STANDARD_MASK: u32 = 0x3f << STANDARD_SHIFT;
const TRANSFER_MASK: u32 = 0x1f << 22;
const RANGE_SHIFT: u32 = 27;
const RANGE_MASK: u32 = 0x7 << RANGE_SHIFT;
const LEGACY_MASK: u32 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorStandard {
    Unspecified,
    Bt709,
    Bt601_625,
    Bt601_625Unadjusted,
    Bt601_525,
    Bt601_525Unadjusted,
    Bt2020,
    Bt2020ConstantLuminance,
    Bt470M,
    Film,
    DciP3,
    AdobeRgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRange {
    Unspecified,
    Full,
    Limited,
    Extended,
}

/// a packed color description: standard, transfer and range bit fields,
/// or one of the legacy enumerated values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Dataspace(pub u32);

impl Dataspace {
    pub const UNKNOWN: Self = Self(0);

    pub const STANDARD_BT709: Self = Self(1 << STANDARD_SHIFT);
    pub const STANDARD_BT601_625: Self = Self(2 << STANDARD_SHIFT);
    pub const STANDARD_BT601_625_UNADJUSTED: Self = Self(3 << STANDARD_SHIFT);
    pub const STANDARD_BT601_525: Self = Self(4 << STANDARD_SHIFT);
    pub const STANDARD_BT601_525_UNADJUSTED: Self = Self(5 << STANDARD_SHIFT);
    pub const STANDARD_BT2020: Self = Self(6 << STANDARD_SHIFT);
    pub const STANDARD_FILM: Self = Self(9 << STANDARD_SHIFT);
    pub const STANDARD_DCI_P3: Self = Self(10 << STANDARD_SHIFT);

    pub const RANGE_FULL: Self = Self(1 << RANGE_SHIFT);
    pub const RANGE_LIMITED: Self = Self(2 << RANGE_SHIFT);

    pub const LEGACY_SRGB_LINEAR: Self = Self(0x200);
    pub const LEGACY_SRGB: Self = Self(0x201);
    pub const LEGACY_JFIF: Self = Self(0x101);
    pub const LEGACY_BT601_625: Self = Self(0x102);
    pub const LEGACY_BT601_525: Self = Self(0x103);
    pub const LEGACY_BT709: Self = Self(0x104);

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_legacy(self) -> bool {
        self.0 & LEGACY_MASK != 0
    }

    /// the value used to look the dataspace up in a capability list
    pub const fn without_transfer(self) -> Self {
        if self.is_legacy() { self } else { Self(self.0 & !TRANSFER_MASK) }
    }

    pub fn standard(self) -> ColorStandard {
        if self.is_legacy() {
            return self.legacy_components().0;
        }
        match (self.0 & STANDARD_MASK) >> STANDARD_SHIFT {
            1 => ColorStandard::Bt709,
            2 => ColorStandard::Bt601_625,
            3 => ColorStandard::Bt601_625Unadjusted,
            4 => ColorStandard::Bt601_525,
            5 => ColorStandard::Bt601_525Unadjusted,
            6 => ColorStandard::Bt2020,
            7 => ColorStandard::Bt2020ConstantLuminance,
            8 => ColorStandard::Bt470M,
            9 => ColorStandard::Film,
            10 => ColorStandard::DciP3,
            11 => ColorStandard::AdobeRgb,
            _ => ColorStandard::Unspecified,
        }
    }

    pub fn range(self) -> ColorRange {
        if self.is_legacy() {
            return self.legacy_components().1;
        }
        match (self.0 & RANGE_MASK) >> RANGE_SHIFT {
            1 => ColorRange::Full,
            2 => ColorRange::Limited,
            3 => ColorRange::Extended,
            _ => ColorRange::Unspecified,
        }
    }

    fn legacy_components(self) -> (ColorStandard, ColorRange) {
        match self {
            Self::LEGACY_SRGB | Self::LEGACY_SRGB_LINEAR => (ColorStandard::Bt709, ColorRange::Full),
            Self::LEGACY_JFIF => (ColorStandard::Bt601_625, ColorRange::Full),
            Self::LEGACY_BT601_625 => (ColorStandard::Bt601_625, ColorRange::Limited),
            Self::LEGACY_BT601_525 => (ColorStandard::Bt601_525, ColorRange::Limited),
            Self::LEGACY_BT709 => (ColorStandard::Bt709, ColorRange::Limited),
            _ => (ColorStandard::Unspecified, ColorRange::Unspecified),
        }
    }

    /// driver colorspace for an image of `size`
    ///
    /// an unspecified standard falls back to bt601 below 720p and bt709 otherwise
    pub fn v4l2_colorspace(self, width: u32, height: u32) -> u32 {
        let full = matches!(self.range(), ColorRange::Full);
        let standard = match self.standard() {
            ColorStandard::Unspecified if width < 1280 && height < 720 => ColorStandard::Bt601_625,
            ColorStandard::Unspecified => ColorStandard::Bt709,
            other => other,
        };
        match standard {
            ColorStandard::Bt709 | ColorStandard::Film if full => v4l2::COLORSPACE_SRGB,
            ColorStandard::Bt709 | ColorStandard::Film => v4l2::COLORSPACE_REC709,
            ColorStandard::Bt2020 | ColorStandard::Bt2020ConstantLuminance => v4l2::COLORSPACE_BT2020,
            ColorStandard::DciP3 => v4l2::COLORSPACE_DCI_P3,
            ColorStandard::AdobeRgb => v4l2::COLORSPACE_SRGB,
            _ if full => v4l2::COLORSPACE_JPEG,
            _ => v4l2::COLORSPACE_SMPTE170M,
        }
    }
}

impl std::fmt::Display for Dataspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

macro_rules! dataspace_ranges {
    ($($standard:ident),* $(,)?) => {
        [$(
            Dataspace::$standard,
            Dataspace::$standard.with(Dataspace::RANGE_FULL),
            Dataspace::$standard.with(Dataspace::RANGE_LIMITED),
        )*]
    };
}

const EXPLICIT: [Dataspace; 24] = dataspace_ranges![
    STANDARD_BT709,
    STANDARD_BT2020,
    STANDARD_BT601_625,
    STANDARD_BT601_525,
    STANDARD_BT601_625_UNADJUSTED,
    STANDARD_BT601_525_UNADJUSTED,
    STANDARD_DCI_P3,
    STANDARD_FILM,
];

const fn concat<const N: usize>(head: &[Dataspace], tail: &[Dataspace]) -> [Dataspace; N] {
    let mut out = [Dataspace::UNKNOWN; N];
    let mut i = 0;
    while i < head.len() {
        out[i] = head[i];
        i += 1;
    }
    let mut j = 0;
    while j < tail.len() {
        out[i + j] = tail[j];
        j += 1;
    }
    out
}

/// preference ordered, the standard of [`Dataspace::UNKNOWN`] follows the resolution, see [`Dataspace::v4l2_colorspace`]
pub const ALL_DATASPACES: [Dataspace; 32] = concat(&EXPLICIT, &[
    Dataspace::UNKNOWN,
    Dataspace::RANGE_FULL,
    Dataspace::RANGE_LIMITED,
    Dataspace::LEGACY_SRGB,
    Dataspace::LEGACY_JFIF,
    Dataspace::LEGACY_BT601_525,
    Dataspace::LEGACY_BT601_625,
    Dataspace::LEGACY_BT709,
]);

pub const SRGB_DATASPACES: [Dataspace; 3] = [
    Dataspace::RANGE_FULL,
    Dataspace::STANDARD_BT709.with(Dataspace::RANGE_FULL),
    Dataspace::LEGACY_SRGB,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_values_decompose() {
        assert_eq!(Dataspace::LEGACY_JFIF.standard(), ColorStandard::Bt601_625);
        assert_eq!(Dataspace::LEGACY_JFIF.range(), ColorRange::Full);
        assert_eq!(Dataspace::LEGACY_BT709.range(), ColorRange::Limited);
    }

    #[test]
    fn transfer_is_ignored_for_lookup() {
        let srgb_transfer = Dataspace(2 << 22);
        let ds = Dataspace::STANDARD_BT709.with(Dataspace::RANGE_FULL).with(srgb_transfer);
        assert_eq!(ds.without_transfer(), Dataspace::STANDARD_BT709.with(Dataspace::RANGE_FULL));
        assert!(SRGB_DATASPACES.contains(&ds.without_transfer()));
    }

    #[test]
    fn unknown_follows_explicit_standards() {
        let unknown = ALL_DATASPACES.iter().position(|ds| *ds == Dataspace::UNKNOWN);
        assert_eq!(unknown, Some(EXPLICIT.len()));
    }

    #[test]
    fn colorspace_defaults_by_resolution() {
        assert_eq!(Dataspace::UNKNOWN.v4l2_colorspace(720, 480), v4l2::COLORSPACE_SMPTE170M);
        assert_eq!(Dataspace::UNKNOWN.v4l2_colorspace(1920, 1080), v4l2::COLORSPACE_REC709);
        assert_eq!(Dataspace::LEGACY_SRGB.v4l2_colorspace(64, 64), v4l2::COLORSPACE_SRGB);
        assert_eq!(Dataspace::LEGACY_JFIF.v4l2_colorspace(64, 64), v4l2::COLORSPACE_JPEG);
    }
}
