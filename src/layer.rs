//! a source image together with how it is composed onto the canvas
use bitflags::bitflags;

use crate::{
    canvas::{Canvas, Modified},
    capability::CompositingModes,
    error::Image,
    geometry::{Coord, Rect, Transform},
    prescale::Transit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// source replaces the destination
    None,
    /// source color is already multiplied by its alpha
    #[default]
    Premultiplied,
    Coverage,
}

impl BlendMode {
    pub const fn compositing_mode(self) -> CompositingModes {
        match self {
            BlendMode::None => CompositingModes::SRC_COPY,
            BlendMode::Premultiplied => CompositingModes::SRC_OVER,
            BlendMode::Coverage => CompositingModes::NONE,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LayerAttr: u32 {
        /// never resample through an intermediate stage
        const NO_RESAMPLING = 1 << 0;
    }
}

#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    canvas: Canvas,
    crop: Rect,
    target: Rect,
    transform: Transform,
    blend: BlendMode,
    alpha: u8,
    attr: LayerAttr,
    z_order: u32,
    transit: Option<Box<Transit>>,
}

impl Layer {
    pub(crate) fn new(id: LayerId) -> Self {
        Self {
            id,
            canvas: Canvas::new(Image::Source(id)),
            crop: Rect::default(),
            target: Rect::default(),
            transform: Transform::empty(),
            blend: BlendMode::default(),
            alpha: u8::MAX,
            attr: LayerAttr::empty(),
            z_order: id.0,
            transit: None,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    /// source crop as configured, may be the zero rect
    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// source crop where the zero rect stands for the whole image
    pub fn image_rect(&self) -> Rect {
        if self.crop.is_zero_area() {
            Rect::from_size(self.canvas.dimension())
        } else {
            self.crop
        }
    }

    pub fn set_image_rect(&mut self, rect: Rect) {
        if self.crop != rect {
            self.crop = rect;
            self.canvas.mark_modified(Modified::DIMENSION);
        }
    }

    /// target rect as configured, may be the zero rect
    pub fn target(&self) -> Rect {
        self.target
    }

    /// target rect where the zero rect fills a canvas of `canvas`
    pub fn target_rect(&self, canvas: Coord) -> Rect {
        if self.target.is_zero_area() {
            Rect::from_size(canvas)
        } else {
            self.target
        }
    }

    pub fn set_target_rect(&mut self, rect: Rect) {
        if self.target != rect {
            self.target = rect;
            self.canvas.mark_modified(Modified::DIMENSION);
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        if self.transform != transform {
            self.transform = transform;
            self.canvas.mark_modified(Modified::COMPOSITION);
        }
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        if self.blend != blend {
            self.blend = blend;
            self.canvas.mark_modified(Modified::COMPOSITION);
        }
    }

    pub fn plane_alpha(&self) -> u8 {
        self.alpha
    }

    pub fn set_plane_alpha(&mut self, alpha: u8) {
        if self.alpha != alpha {
            self.alpha = alpha;
            self.canvas.mark_modified(Modified::COMPOSITION);
        }
    }

    pub fn attr(&self) -> LayerAttr {
        self.attr
    }

    pub fn set_attr(&mut self, attr: LayerAttr) {
        if self.attr != attr {
            self.attr = attr;
            self.canvas.mark_modified(Modified::COMPOSITION);
        }
    }

    /// lower values are composed first, defaults to creation order
    pub fn z_order(&self) -> u32 {
        self.z_order
    }

    pub fn set_z_order(&mut self, z_order: u32) {
        self.z_order = z_order;
    }

    pub fn transit(&self) -> Option<&Transit> {
        self.transit.as_deref()
    }

    pub(crate) fn transit_mut(&mut self) -> Option<&mut Transit> {
        self.transit.as_deref_mut()
    }

    pub(crate) fn transit_slot(&mut self) -> &mut Option<Box<Transit>> {
        &mut self.transit
    }

    /// make this layer read the source image of `other` in full onto its canvas
    ///
    /// the acquire fence moves along, the transform only when `inherit_transform`
    pub(crate) fn import_layer(&mut self, other: &mut Layer, inherit_transform: bool) {
        self.canvas.copy_image_from(&other.canvas);
        self.canvas.set_fence(other.canvas.take_fence());
        self.set_image_rect(other.image_rect());
        self.set_target_rect(Rect::default());
        self.set_transform(if inherit_transform { other.transform } else { Transform::empty() });
        self.set_blend(BlendMode::None);
        self.set_plane_alpha(u8::MAX);
        self.set_attr(LayerAttr::empty());
    }
}
