//! resize through a nested engine when one stage cannot reach the scale ratio
use std::os::fd::{AsRawFd, OwnedFd};

use crate::{
    allocator::BufferAllocator,
    backend::Blitter,
    canvas::{Canvas, CanvasAttr, Plane},
    capability::Capability,
    compositor::Compositor,
    dataspace::Dataspace,
    error::{Error, Result},
    format::PixelFormat,
    geometry::{div_align_up, Coord},
    layer::{Layer, LayerId},
};

/// the intermediate image a prescale stage writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrescalePlan {
    pub size: Coord,
    pub format: PixelFormat,
    pub dataspace: Dataspace,
    /// at least one axis is magnified in two stages, the prescale stage then rotates too
    pub upscaling: bool,
    pub len: u32,
}

/// intermediate image for `layer` heading to a `target` sized rect of `canvas`
pub fn plan(cap: &Capability, layer: &Layer, canvas: &Canvas, target: Coord) -> PrescalePlan {
    let source = layer.canvas();
    let (mut format, mut dataspace) = (source.format(), source.dataspace());
    let mut chroma = format.chroma_subsampling();

    // NOTE: #1 the conversion happens in the prescale stage, keep the less
    // subsampled side so no new chroma alignment constraint appears
    if canvas.format().chroma_subsampling() < chroma {
        chroma = canvas.format().chroma_subsampling();
        format = canvas.format();
        dataspace = canvas.dataspace();
    }

    let transform = layer.transform();
    let target = transform.to_source_orientation(target);
    let image = layer.image_rect().size;
    let mag = cap.max_upsampling;
    let min = cap.max_downsampling;

    let mut upscaling = false;
    let mut axis = |image: u32, target: u32, mag: u32, min: u32, align: u8| {
        let magnified = image.saturating_mul(mag);
        if magnified < target {
            upscaling = true;
            magnified
        } else if image as u64 > target as u64 * min as u64 {
            div_align_up(image, min, align as u32)
        } else {
            target
        }
    };

    let mut size = Coord::new(
        axis(image.hori, target.hori, mag.hori, min.hori, chroma.hori),
        axis(image.vert, target.vert, mag.vert, min.vert, chroma.vert),
    );

    if upscaling && transform.swaps_axes() {
        size = size.swap();
    }

    // NOTE: #2 never compressed, intermediate images are continuous-tone video
    let format = format.single_buffer_equivalent();
    PrescalePlan {
        size,
        format,
        dataspace,
        upscaling,
        len: format.plane_length(0, size.hori, size.vert),
    }
}

#[derive(Debug)]
pub struct TransitBuffer {
    fd: OwnedFd,
    len: u32,
    protected: bool,
}

/// prescale state cached on a layer across frames
#[derive(Debug)]
pub struct Transit {
    engine: Box<Blitter>,
    layer: LayerId,
    buffer: Option<TransitBuffer>,
}

impl Transit {
    pub fn new(mut engine: Blitter) -> Result<Self> {
        let layer = engine.create_layer()?;
        Ok(Self { engine: Box::new(engine), layer, buffer: None })
    }

    pub fn engine(&self) -> &Blitter {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Blitter {
        &mut self.engine
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn buffer_len(&self) -> Option<u32> {
        self.buffer.as_ref().map(|buffer| buffer.len)
    }

    /// whether the prescale stage already rotated or flipped the image
    pub fn applies_transform(&self) -> bool {
        self.engine.scene().layer(self.layer).is_some_and(|layer| !layer.transform().is_empty())
    }

    /// reuse the intermediate buffer unless it is too small or of the wrong protection
    pub(crate) fn ensure_buffer(
        &mut self,
        len: u32,
        protected: bool,
        allocator: &dyn BufferAllocator,
    ) -> Result<&TransitBuffer> {
        if self.buffer.as_ref().is_some_and(|buffer| buffer.len < len || buffer.protected != protected) {
            tracing::debug!("releasing prescale buffer for a new one of {len} bytes");
            self.buffer = None;
        }

        let buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => {
                let fd = allocator
                    .allocate(len, protected)
                    .map_err(|source| Error::Allocation { len, source })?;
                TransitBuffer { fd, len, protected }
            }
        };
        Ok(self.buffer.insert(buffer))
    }

    /// submit the prescale stage reading the source of `outer`
    ///
    /// returns the release fence of the intermediate image, `None` when the
    /// stage already completed
    pub(crate) fn run(
        &mut self,
        plan: &PrescalePlan,
        outer: &mut Layer,
        allocator: &dyn BufferAllocator,
    ) -> Result<Option<OwnedFd>> {
        let protected = outer.canvas().is_protected();
        let (fd, len) = {
            let buffer = self.ensure_buffer(plan.len, protected, allocator)?;
            (buffer.fd.as_raw_fd(), buffer.len)
        };
        let attr = if protected { CanvasAttr::PROTECTED } else { CanvasAttr::empty() };

        let canvas = self.engine.canvas_mut();
        canvas.set_dimension(plan.size.hori, plan.size.vert);
        canvas.set_image_type(plan.format, plan.dataspace);
        canvas.set_buffer(&[Plane::dmabuf(fd, 0, len)], None, attr)?;

        self.engine.layer_mut(self.layer)?.import_layer(outer, plan.upscaling);

        let mut release = [None];
        if let Err(err) = self.engine.execute(&mut release) {
            tracing::error!("prescaling {} to {} failed: {err}", outer.image_rect().size, plan.size);
            return Err(err);
        }
        tracing::debug!("prescaling {} to {}", outer.image_rect().size, plan.size);

        let [fence] = release;
        if fence.is_none() {
            self.engine.wait_idle()?;
        }
        Ok(fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allocator::tests::CountingAllocator,
        backend::{dummy::DUMMY, DummyCompositor},
        capability::G2D_8895,
        geometry::{Rect, Transform},
    };

    fn layer(format: PixelFormat, width: u32, height: u32) -> Layer {
        let mut layer = Layer::new(LayerId(0));
        layer.canvas_mut().set_dimension(width, height);
        layer.canvas_mut().set_image_type(format, Dataspace::UNKNOWN);
        layer
    }

    fn canvas(format: PixelFormat) -> Canvas {
        let mut canvas = Canvas::default();
        canvas.set_image_type(format, Dataspace::UNKNOWN);
        canvas
    }

    #[test]
    fn downscale_is_divided_and_chroma_aligned() {
        let cap = Capability { max_downsampling: Coord::new(16, 16), ..G2D_8895 };
        let layer = layer(PixelFormat::Nv12, 100, 100);
        let plan = plan(&cap, &layer, &canvas(PixelFormat::Nv12), Coord::new(1, 1));
        assert_eq!(plan.size, Coord::new(8, 8));
        assert!(!plan.upscaling);
        assert_eq!(plan.len, PixelFormat::Nv12.plane_length(0, 8, 8));
    }

    #[test]
    fn less_subsampled_format_is_used() {
        let cap = Capability { max_downsampling: Coord::new(16, 16), ..G2D_8895 };
        let layer = layer(PixelFormat::Nv12M, 100, 100);
        let plan = plan(&cap, &layer, &canvas(PixelFormat::Rgba8888), Coord::new(1, 1));
        assert_eq!(plan.format, PixelFormat::Rgba8888);
        assert_eq!(plan.size, Coord::new(7, 7));

        let plan = super::plan(&cap, &layer, &canvas(PixelFormat::Nv12), Coord::new(1, 1));
        assert_eq!(plan.format, PixelFormat::Nv12);
    }

    #[test]
    fn upscale_stops_at_max_magnification() {
        let cap = Capability { max_upsampling: Coord::new(8, 8), ..G2D_8895 };
        let mut layer = layer(PixelFormat::Rgba8888, 10, 20);
        layer.set_image_rect(Rect::new(0, 0, 10, 20));
        let plan = plan(&cap, &layer, &canvas(PixelFormat::Rgba8888), Coord::new(200, 100));
        assert!(plan.upscaling);
        assert_eq!(plan.size, Coord::new(80, 100));
    }

    #[test]
    fn rotated_upscale_is_in_target_orientation() {
        let cap = Capability { max_upsampling: Coord::new(8, 8), ..G2D_8895 };
        let mut layer = layer(PixelFormat::Rgba8888, 10, 30);
        layer.set_transform(Transform::ROT_90);
        // in source orientation the target is 100x200, only the width is out of range
        let plan = plan(&cap, &layer, &canvas(PixelFormat::Rgba8888), Coord::new(200, 100));
        assert!(plan.upscaling);
        assert_eq!(plan.size, Coord::new(200, 80));
    }

    #[test]
    fn buffer_is_reused_until_it_is_too_small() {
        let allocator = CountingAllocator::default();
        let mut transit = Transit::new(Blitter::Dummy(DummyCompositor::new(&DUMMY))).unwrap();

        transit.ensure_buffer(4096, false, &allocator).unwrap();
        transit.ensure_buffer(1024, false, &allocator).unwrap();
        assert_eq!(allocator.count(), 1);
        assert_eq!(transit.buffer_len(), Some(4096));

        transit.ensure_buffer(8192, false, &allocator).unwrap();
        assert_eq!(allocator.count(), 2);

        transit.ensure_buffer(1024, true, &allocator).unwrap();
        assert_eq!(allocator.count(), 3);
        assert_eq!(transit.buffer_len(), Some(1024));
    }
}
