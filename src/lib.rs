pub mod allocator;
pub mod backend;
pub mod canvas;
pub mod capability;
pub mod compositor;
pub mod config;
pub mod dataspace;
pub mod error;
pub mod factory;
mod fence;
pub mod format;
pub mod geometry;
pub mod layer;
pub mod perf;
pub mod prescale;
pub mod scene;

pub use backend::Blitter;
pub use canvas::{Canvas, CanvasAttr, Plane};
pub use capability::Capability;
pub use compositor::{Compositor, ExecHandle, Prioritized, Priority};
pub use config::Config;
pub use error::{Error, Result};
pub use layer::{Layer, LayerId};
pub use scene::{Color, Scene};
