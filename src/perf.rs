//! forecast of upcoming frames and the bandwidth it costs
use crate::{
    error::{Error, Result},
    format::PixelFormat,
    geometry::{Coord, Rect, Transform},
};

pub const MAX_FRAMES: usize = blit_uapi::m2m1shot2::PERF_MAX_FRAMES;
pub const MAX_LAYERS: usize = blit_uapi::m2m1shot2::MAX_IMAGES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceLayer {
    pub source: Rect,
    pub target: Rect,
    pub format: PixelFormat,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceFrame {
    pub layers: Vec<PerformanceLayer>,
    pub target: Coord,
    pub target_format: PixelFormat,
    pub frame_rate: u32,
    pub has_background: bool,
}

impl PerformanceFrame {
    pub fn new(target: Coord, target_format: PixelFormat, frame_rate: u32) -> Self {
        Self { layers: Vec::new(), target, target_format, frame_rate, has_background: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformanceRequest {
    pub frames: Vec<PerformanceFrame>,
}

impl PerformanceRequest {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.frames.len() > MAX_FRAMES {
            return Err(Error::InvalidRequest("too many frames"));
        }
        if self.frames.iter().any(|frame| frame.layers.len() > MAX_LAYERS) {
            return Err(Error::InvalidRequest("too many layers in a frame"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerLoad {
    pub pixelcount: u32,
    pub rotated: bool,
}

/// what one forecast frame asks from the memory bus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLoad {
    pub layers: Vec<LayerLoad>,
    pub frame_rate: u32,
    pub target_pixelcount: u32,
    pub bandwidth_read: u32,
    pub bandwidth_write: u32,
    pub solid_color_fill: bool,
}

/// bandwidth in the unit the driver expects
///
/// each layer reads `max(src, dst)` pixels weighted by 16, or by 18 when it
/// is resampled. the write side halves its shift when a rotated yuv420
/// source lands on a 12 bit target
pub fn estimate(frame: &PerformanceFrame) -> FrameLoad {
    let mut read: u64 = 0;
    let mut yuv420 = false;
    let mut rotate = false;
    let mut layers = Vec::with_capacity(frame.layers.len());

    for layer in &frame.layers {
        let pixelcount = layer.source.size.area().max(layer.target.size.area());
        let bpp = layer.format.bits_per_pixel() as u64;
        yuv420 |= bpp == 12;

        let rotated = layer.transform.swaps_axes();
        rotate |= rotated;
        let scaled = layer.source.size != layer.transform.to_source_orientation(layer.target.size);

        let weight = if scaled { 18 } else { 16 };
        read += pixelcount * bpp * weight;
        layers.push(LayerLoad { pixelcount: saturate(pixelcount), rotated });
    }

    let fps = frame.frame_rate as u64;
    let target_bpp = frame.target_format.bits_per_pixel() as u64;
    let shift = if target_bpp == 12 && yuv420 && rotate { 12 } else { 13 };

    FrameLoad {
        layers,
        frame_rate: frame.frame_rate,
        target_pixelcount: saturate(frame.target.area()),
        bandwidth_read: saturate((read * fps) >> 17),
        bandwidth_write: saturate((frame.target.area() * fps * target_bpp) >> shift),
        solid_color_fill: frame.has_background,
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fullscreen(format: PixelFormat, transform: Transform, source: Rect) -> PerformanceFrame {
        let mut frame = PerformanceFrame::new(Coord::new(1920, 1080), PixelFormat::Rgba8888, 60);
        frame.layers.push(PerformanceLayer {
            source,
            target: Rect::new(0, 0, 1920, 1080),
            format,
            transform,
        });
        frame
    }

    #[test]
    fn unscaled_rgb_layer() {
        let frame = fullscreen(PixelFormat::Rgba8888, Transform::empty(), Rect::new(0, 0, 1920, 1080));
        let load = estimate(&frame);
        let pixels = 1920 * 1080u64;
        assert_eq!(load.bandwidth_read as u64, (pixels * 32 * 16 * 60) >> 17);
        assert_eq!(load.bandwidth_write as u64, (pixels * 60 * 32) >> 13);
        assert_eq!(load.layers, [LayerLoad { pixelcount: pixels as u32, rotated: false }]);
    }

    #[test]
    fn scaling_costs_more() {
        let unscaled = estimate(&fullscreen(PixelFormat::Rgba8888, Transform::empty(), Rect::new(0, 0, 1920, 1080)));
        let scaled = estimate(&fullscreen(PixelFormat::Rgba8888, Transform::empty(), Rect::new(0, 0, 1280, 720)));
        assert!(scaled.bandwidth_read > unscaled.bandwidth_read);
    }

    #[test]
    fn rotation_compares_swapped_axes() {
        let frame = fullscreen(PixelFormat::Rgba8888, Transform::ROT_90, Rect::new(0, 0, 1080, 1920));
        let load = estimate(&frame);
        let pixels = 1920 * 1080u64;
        assert_eq!(load.bandwidth_read as u64, (pixels * 32 * 16 * 60) >> 17);
        assert!(load.layers[0].rotated);
    }

    #[test]
    fn rotated_yuv_to_yuv_halves_the_write_shift() {
        let mut frame = fullscreen(PixelFormat::Nv12, Transform::ROT_90, Rect::new(0, 0, 1080, 1920));
        frame.target_format = PixelFormat::Nv12;
        let load = estimate(&frame);
        assert_eq!(load.bandwidth_write as u64, (1920 * 1080u64 * 60 * 12) >> 12);
    }

    #[test]
    fn oversized_requests_are_rejected() {
        let frame = PerformanceFrame::new(Coord::new(64, 64), PixelFormat::Rgba8888, 60);
        let request = PerformanceRequest { frames: vec![frame; MAX_FRAMES + 1] };
        assert!(matches!(request.check(), Err(Error::InvalidRequest(_))));
    }
}
