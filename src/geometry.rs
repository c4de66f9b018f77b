//! sizes, rectangles and geometric transforms
use bitflags::bitflags;

/// a pair of horizontal and vertical values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Coord {
    pub hori: u32,
    pub vert: u32,
}

impl Coord {
    pub const fn new(hori: u32, vert: u32) -> Self {
        Self { hori, vert }
    }

    pub const fn swap(self) -> Self {
        Self { hori: self.vert, vert: self.hori }
    }

    pub const fn area(self) -> u64 {
        self.hori as u64 * self.vert as u64
    }

    pub const fn is_zero_area(self) -> bool {
        self.hori == 0 || self.vert == 0
    }

    /// whether both axes lie in `min..=max`
    pub const fn within(self, min: Coord, max: Coord) -> bool {
        self.hori >= min.hori && self.hori <= max.hori && self.vert >= min.vert && self.vert <= max.vert
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.hori, self.vert)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub pos: Coord,
    pub size: Coord,
}

impl Rect {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { pos: Coord::new(left, top), size: Coord::new(width, height) }
    }

    pub const fn from_size(size: Coord) -> Self {
        Self { pos: Coord::new(0, 0), size }
    }

    pub const fn is_zero_area(&self) -> bool {
        self.size.is_zero_area()
    }

    pub const fn right(&self) -> u64 {
        self.pos.hori as u64 + self.size.hori as u64
    }

    pub const fn bottom(&self) -> u64 {
        self.pos.vert as u64 + self.size.vert as u64
    }

    /// whether the rect lies entirely inside an image of `size`
    pub const fn fits_in(&self, size: Coord) -> bool {
        self.right() <= size.hori as u64 && self.bottom() <= size.vert as u64
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@({},{})", self.size, self.pos.hori, self.pos.vert)
    }
}

bitflags! {
    /// rotation is clockwise and applied after flipping
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Transform: u32 {
        const FLIP_H = 1 << 0;
        const FLIP_V = 1 << 1;
        const ROT_90 = 1 << 2;
        const ROT_180 = Self::FLIP_H.bits() | Self::FLIP_V.bits();
        const ROT_270 = Self::ROT_180.bits() | Self::ROT_90.bits();
    }
}

impl Transform {
    /// whether the output axes are swapped relative to the input
    pub const fn swaps_axes(self) -> bool {
        self.contains(Self::ROT_90)
    }

    /// `size` expressed in the orientation of the input image
    pub const fn to_source_orientation(self, size: Coord) -> Coord {
        if self.swaps_axes() { size.swap() } else { size }
    }
}

/// `value` rounded up to a multiple of `align`, which must be a power of two
pub const fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// `value / div` rounded up, then aligned up to `align`
pub const fn div_align_up(value: u32, div: u32, align: u32) -> u32 {
    align_up(value.div_ceil(div), align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rot270_is_all_bits() {
        assert_eq!(Transform::ROT_270, Transform::all());
        assert!(Transform::ROT_270.swaps_axes());
        assert!(!Transform::ROT_180.swaps_axes());
    }

    #[test]
    fn div_align_rounds_up_twice() {
        assert_eq!(div_align_up(100, 16, 2), 8);
        assert_eq!(div_align_up(96, 16, 2), 6);
        assert_eq!(div_align_up(100, 16, 1), 7);
    }

    #[test]
    fn rect_bounds() {
        let rect = Rect::new(10, 20, 100, 50);
        assert!(rect.fits_in(Coord::new(110, 70)));
        assert!(!rect.fits_in(Coord::new(109, 70)));
        assert!(Rect::new(5, 5, 0, 10).is_zero_area());
    }
}
