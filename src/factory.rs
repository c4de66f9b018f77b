//! engines by hardware spec identifier
use std::sync::Arc;

use crate::{
    allocator::DmaHeapAllocator,
    backend::{
        g2d::Fimg2dDevice, scaler::V4l2Device, Blitter, DummyCompositor, G2dCompositor, StreamScaler,
    },
    capability::{
        Capability, G2D_8890, G2D_8895, G2D_9610, G2D_9810, G2D_9810_BLTER, G2D_L16FSBWC, G2D_L8FSBWCL,
        MSCL_9810,
    },
    config::Config,
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// single-shot job protocol
    OneShot,
    /// streaming mem2mem scaler
    Streaming,
    Dummy,
}

#[derive(Debug)]
pub struct Spec {
    pub id: &'static str,
    pub kind: EngineKind,
    pub capability: &'static Capability,
}

const fn spec(id: &'static str, kind: EngineKind, capability: &'static Capability) -> Spec {
    Spec { id, kind, capability }
}

pub static SPECS: [Spec; 12] = [
    spec("fimg2d_8890", EngineKind::OneShot, &G2D_8890),
    spec("fimg2d_8895", EngineKind::OneShot, &G2D_8895),
    spec("fimg2d_9610", EngineKind::OneShot, &G2D_9610),
    spec("fimg2d_9810", EngineKind::OneShot, &G2D_9810),
    spec("fimg2d_9810_blter", EngineKind::OneShot, &G2D_9810_BLTER),
    spec("fimg2d_9820", EngineKind::OneShot, &G2D_9810),
    spec("fimg2d_L16FSBWC", EngineKind::OneShot, &G2D_L16FSBWC),
    spec("fimg2d_L8FSBWCL", EngineKind::OneShot, &G2D_L8FSBWCL),
    spec("mscl_9810", EngineKind::Streaming, &MSCL_9810),
    // NOTE: #1 compressed formats are not modelled, the sbwc scalers take the plain table
    spec("mscl_sbwc", EngineKind::Streaming, &MSCL_9810),
    spec("mscl_sbwcl", EngineKind::Streaming, &MSCL_9810),
    spec("dummy", EngineKind::Dummy, &crate::backend::dummy::DUMMY),
];

pub fn lookup(id: &str) -> Option<&'static Spec> {
    SPECS.iter().find(|spec| spec.id == id)
}

/// the `default_*` aliases are taken from `config`, anything else is returned as is
pub fn resolve<'a>(id: &'a str, config: &'a Config) -> &'a str {
    match id {
        "default_compositor" => config.default_compositor.as_str(),
        "default_scaler" => config.default_scaler.as_str(),
        "default_blter" => config.default_blter.as_str(),
        id => id,
    }
}

pub fn try_create(id: &str, config: &Config) -> Result<Blitter> {
    let resolved = resolve(id, config);
    let spec = lookup(resolved).ok_or_else(|| Error::UnknownSpec(resolved.to_owned()))?;

    let engine = match spec.kind {
        EngineKind::OneShot => {
            let device = Fimg2dDevice::open(&config.g2d_device).map_err(|errno| Error::device("open g2d", errno))?;
            let allocator = Arc::new(DmaHeapAllocator::new(&config.dma_heap, &config.secure_dma_heap));
            let mut g2d = G2dCompositor::new(spec.capability, Box::new(device), allocator);
            g2d.set_prescale_enabled(!config.disable_prescale);
            Blitter::G2d(g2d)
        }
        EngineKind::Streaming => {
            let device =
                V4l2Device::open(&config.scaler_device).map_err(|errno| Error::device("open scaler", errno))?;
            Blitter::Scaler(StreamScaler::new(spec.capability, Box::new(device)))
        }
        EngineKind::Dummy => Blitter::Dummy(DummyCompositor::new(spec.capability)),
    };

    tracing::info!("created {} engine of {}", engine.name(), spec.id);
    Ok(engine)
}

/// like [`try_create`], failures are logged
pub fn create(id: &str, config: &Config) -> Option<Blitter> {
    match try_create(id, config) {
        Ok(engine) => Some(engine),
        Err(err) => {
            tracing::error!("failed to create engine {id:?}: {err}");
            None
        }
    }
}

pub fn create_compositor(config: &Config) -> Option<Blitter> {
    create("default_compositor", config)
}

pub fn create_scaler(config: &Config) -> Option<Blitter> {
    create("default_scaler", config)
}

pub fn create_blter(config: &Config) -> Option<Blitter> {
    create("default_blter", config)
}
