//! state every engine carries: the canvas, its layers and their validation
use crate::{
    canvas::{Canvas, CanvasAttr},
    capability::{Capability, Features},
    compositor::Priority,
    error::{Error, Result},
    layer::{Layer, LayerAttr, LayerId},
};

/// 16 bits per channel background fill color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

impl Color {
    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    /// from 8 bits per channel `0xRRGGBBAA`
    pub const fn from_rgba8888(rgba: u32) -> Self {
        const fn channel(rgba: u32, shift: u32) -> u16 {
            ((rgba >> shift) & 0xff) as u16 * 0x101
        }
        Self::new(channel(rgba, 24), channel(rgba, 16), channel(rgba, 8), channel(rgba, 0))
    }

    pub const fn to_argb8888(self) -> u32 {
        (self.a as u32 >> 8) << 24 | (self.r as u32 >> 8) << 16 | (self.g as u32 >> 8) << 8 | self.b as u32 >> 8
    }
}

#[derive(Debug)]
pub struct Scene {
    capability: &'static Capability,
    canvas: Canvas,
    layers: Vec<Layer>,
    next_id: u32,
    background: Option<Color>,
    priority: Priority,
    prescale: bool,
}

impl Scene {
    pub fn new(capability: &'static Capability) -> Self {
        Self {
            capability,
            canvas: Canvas::default(),
            layers: Vec::new(),
            next_id: 0,
            background: None,
            priority: Priority::Default,
            prescale: capability.can_prescale(),
        }
    }

    pub fn capability(&self) -> &'static Capability {
        self.capability
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id() == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.id() == id)
    }

    pub fn create_layer(&mut self) -> Result<LayerId> {
        let max = self.capability.max_layers;
        if self.layers.len() >= max as usize {
            return Err(Error::TooManyLayers { count: self.layers.len() + 1, max });
        }
        self.layers.try_reserve(1)?;

        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.push(Layer::new(id));
        tracing::trace!("created {id}");
        Ok(id)
    }

    /// the layer and any prescale state it owns are returned to the caller to drop
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        let index = self.layers.iter().position(|layer| layer.id() == id)?;
        Some(self.layers.remove(index))
    }

    pub fn background_color(&self) -> Option<Color> {
        self.background
    }

    pub fn set_background_color(&mut self, color: Option<Color>) {
        self.background = color;
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub fn prescale_enabled(&self) -> bool {
        self.prescale
    }

    pub(crate) fn set_prescale_enabled(&mut self, enabled: bool) {
        self.prescale = enabled && self.capability.can_prescale();
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Canvas, &mut [Layer]) {
        (&mut self.canvas, &mut self.layers)
    }

    /// stable, by z-order
    pub(crate) fn sort_layers(&mut self) {
        self.layers.sort_by_key(Layer::z_order);
    }

    /// after a successful execution: fences are consumed and nothing is modified anymore
    pub(crate) fn finish_execution(&mut self) {
        self.canvas.set_fence(None);
        self.canvas.clear_modified();
        for layer in &mut self.layers {
            layer.canvas_mut().set_fence(None);
            layer.canvas_mut().clear_modified();
        }
    }

    pub(crate) fn invalidate_fences(&mut self) {
        self.canvas.set_fence(None);
        for layer in &mut self.layers {
            layer.canvas_mut().set_fence(None);
        }
    }

    /// check every image against the capability, nothing is mutated
    pub fn validate(&self) -> Result<()> {
        let cap = self.capability;
        validate_canvas(cap, &self.canvas, true)?;

        for layer in &self.layers {
            validate_layer(cap, layer, self.canvas.dimension(), self.prescale)?;
        }
        Ok(())
    }
}

fn validate_canvas(cap: &Capability, canvas: &Canvas, is_target: bool) -> Result<()> {
    let image = canvas.image();
    let format = canvas.format();

    if canvas.planes().is_empty() {
        return Err(Error::NoBuffer { image });
    }
    if !cap.supports_format(format) {
        return Err(Error::UnsupportedFormat { image, format });
    }
    if !cap.supports_dataspace(canvas.dataspace()) {
        return Err(Error::UnsupportedDataspace { image, dataspace: canvas.dataspace() });
    }

    let size = canvas.dimension();
    let size_ok = if is_target { cap.supports_dst_dimension(size) } else { cap.supports_src_dimension(size) };
    if !size_ok {
        return Err(Error::InvalidDimension { image, size });
    }

    let required = format.buffer_count();
    if canvas.planes().len() < required {
        return Err(Error::BufferCount { image, format, required, configured: canvas.planes().len() });
    }
    if canvas.planes().iter().any(|plane| plane.offset % cap.base_align != 0) {
        return Err(Error::Misaligned { image, what: "buffer offset" });
    }

    let attr = canvas.attr();
    let afbc = if is_target { Features::AFBC_ENCODE } else { Features::AFBC_DECODE };
    if attr.contains(CanvasAttr::COMPRESSED) && !cap.supports_feature(afbc) {
        return Err(Error::Unsupported { image, feature: "compressed buffers" });
    }
    if is_target && attr.contains(CanvasAttr::UORDER) && !cap.supports_feature(Features::UORDER_WRITE) {
        return Err(Error::Unsupported { image, feature: "u-order writes" });
    }
    Ok(())
}

fn validate_layer(cap: &Capability, layer: &Layer, canvas: crate::geometry::Coord, prescale: bool) -> Result<()> {
    validate_canvas(cap, layer.canvas(), false)?;
    let image = layer.canvas().image();

    let crop = layer.image_rect();
    let size = layer.canvas().dimension();
    if crop.is_zero_area() || !crop.fits_in(size) {
        return Err(Error::InvalidRect { image, rect: crop, size });
    }
    if !cap.is_aligned(crop) {
        return Err(Error::Misaligned { image, what: "crop rect" });
    }

    let target = layer.target_rect(canvas);
    if !target.fits_in(canvas) {
        return Err(Error::InvalidRect { image, rect: target, size: canvas });
    }

    if !cap.supports_transform(layer.transform()) {
        return Err(Error::Unsupported { image, feature: "transform" });
    }
    if !cap.supports_blend(layer.blend()) {
        return Err(Error::Unsupported { image, feature: "blend mode" });
    }
    if layer.plane_alpha() < u8::MAX && !cap.supports_feature(Features::PLANE_ALPHA) {
        return Err(Error::Unsupported { image, feature: "plane alpha" });
    }

    let transform = layer.transform();
    if !cap.supports_resampling(crop.size, target.size, transform) {
        let reachable = if layer.attr().contains(LayerAttr::NO_RESAMPLING) {
            cap.supports_resizing(crop.size, target.size, transform)
        } else {
            prescale
        };
        if !reachable {
            return Err(Error::ScaleOutOfRange { image, src: crop.size, dst: target.size });
        }
    }
    Ok(())
}
