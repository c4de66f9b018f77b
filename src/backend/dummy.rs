//! an engine without hardware, jobs validate and complete immediately
use std::os::fd::OwnedFd;

use crate::{
    capability::{Capability, CompositingModes, Features, G2D_FORMATS},
    compositor::{Compositor, ExecHandle, Submission},
    dataspace::ALL_DATASPACES,
    error::Result,
    fence,
    geometry::{Coord, Transform},
    perf::PerformanceRequest,
    scene::Scene,
};

pub static DUMMY: Capability = Capability {
    max_upsampling: Coord::new(64, 64),
    max_downsampling: Coord::new(16, 16),
    max_upsizing: Coord::new(64, 64),
    max_downsizing: Coord::new(16, 16),
    min_src_dimension: Coord::new(1, 1),
    max_src_dimension: Coord::new(8192, 8192),
    min_dst_dimension: Coord::new(1, 1),
    max_dst_dimension: Coord::new(8192, 8192),
    min_pix_align: Coord::new(1, 1),
    rescaling_count: 0,
    compositing_modes: CompositingModes::all(),
    transforms: Transform::all(),
    features: Features::PLANE_ALPHA,
    max_layers: 16,
    formats: G2D_FORMATS,
    dataspaces: &ALL_DATASPACES,
    base_align: 1,
};

#[derive(Debug)]
pub struct DummyCompositor {
    scene: Scene,
    submission: Submission,
    executed: u64,
}

impl DummyCompositor {
    pub fn new(capability: &'static Capability) -> Self {
        Self { scene: Scene::new(capability), submission: Submission::default(), executed: 0 }
    }

    /// successful executions so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    fn run(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()> {
        fence::clear_slots(release_fences);
        self.scene.validate()?;
        self.scene.sort_layers();
        self.scene.finish_execution();
        self.executed += 1;
        tracing::trace!("dummy job with {} layers", self.scene.layers().len());
        Ok(())
    }
}

impl Compositor for DummyCompositor {
    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn execute(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()> {
        self.run(release_fences)
    }

    fn submit(&mut self) -> Result<ExecHandle> {
        self.run(&mut [])?;
        Ok(self.submission.issue())
    }

    fn execute_blocking(&mut self) -> Result<()> {
        self.run(&mut [])
    }

    fn wait_execution(&mut self, handle: ExecHandle) -> Result<()> {
        self.submission.complete(handle);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        Ok(())
    }

    fn request_performance_qos(&mut self, request: Option<&PerformanceRequest>) -> Result<()> {
        if let Some(request) = request {
            request.check()?;
        }
        Ok(())
    }
}
