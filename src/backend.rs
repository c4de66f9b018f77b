//! concrete engines and the closed set of them
use std::os::fd::OwnedFd;

use crate::{
    compositor::{Compositor, ExecHandle, Prioritized, Priority},
    error::Result,
    perf::PerformanceRequest,
    scene::Scene,
};

pub mod dummy;
pub mod g2d;
pub mod job;
pub mod scaler;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use dummy::DummyCompositor;
pub use g2d::{G2dCompositor, OneShotDevice};
pub use scaler::{StreamDevice, StreamScaler};

/// every engine this crate can drive
#[derive(Debug)]
pub enum Blitter {
    G2d(G2dCompositor),
    Scaler(StreamScaler),
    Dummy(DummyCompositor),
}

macro_rules! dispatch {
    ($self:ident, $engine:ident => $body:expr) => {
        match $self {
            Blitter::G2d($engine) => $body,
            Blitter::Scaler($engine) => $body,
            Blitter::Dummy($engine) => $body,
        }
    };
}

impl Blitter {
    pub fn name(&self) -> &'static str {
        match self {
            Blitter::G2d(_) => "g2d",
            Blitter::Scaler(_) => "scaler",
            Blitter::Dummy(_) => "dummy",
        }
    }
}

impl Compositor for Blitter {
    fn scene(&self) -> &Scene {
        dispatch!(self, engine => engine.scene())
    }

    fn scene_mut(&mut self) -> &mut Scene {
        dispatch!(self, engine => engine.scene_mut())
    }

    fn execute(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()> {
        dispatch!(self, engine => engine.execute(release_fences))
    }

    fn submit(&mut self) -> Result<ExecHandle> {
        dispatch!(self, engine => engine.submit())
    }

    fn execute_blocking(&mut self) -> Result<()> {
        dispatch!(self, engine => engine.execute_blocking())
    }

    fn wait_execution(&mut self, handle: ExecHandle) -> Result<()> {
        dispatch!(self, engine => engine.wait_execution(handle))
    }

    fn wait_idle(&mut self) -> Result<()> {
        dispatch!(self, engine => engine.wait_idle())
    }

    fn prioritize(&mut self, priority: Priority) -> Result<Prioritized> {
        dispatch!(self, engine => engine.prioritize(priority))
    }

    fn request_performance_qos(&mut self, request: Option<&PerformanceRequest>) -> Result<()> {
        dispatch!(self, engine => engine.request_performance_qos(request))
    }
}
