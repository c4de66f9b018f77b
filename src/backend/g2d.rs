//! fimg2d engines driven through the single-shot job protocol
use blit_uapi::{m2m1shot2 as uapi, Errno};
use rustix::fs::{Mode, OFlags};
use std::{
    ffi::c_ulong,
    fmt,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{
    job::{job_blend, job_transform, ImageFlags, Job, JobFlags, JobImage},
    Blitter,
};
use crate::{
    allocator::BufferAllocator,
    canvas::{BufferHandle, Canvas, MemoryType},
    capability::Capability,
    compositor::{Compositor, ExecHandle, Prioritized, Priority, Submission},
    error::{Error, Result},
    fence,
    geometry::{Coord, Rect, Transform},
    layer::{Layer, LayerAttr},
    perf::{self, FrameLoad, PerformanceRequest},
    prescale::{self, Transit},
    scene::Scene,
};

/// a context on a single-shot job device
pub trait OneShotDevice: fmt::Debug + Send {
    /// submit `job`, release fences and the error flag are written back into it
    fn process(&mut self, job: &mut Job) -> rustix::io::Result<()>;

    /// block until the last job of this context completes
    fn wait(&mut self, job: &mut Job) -> rustix::io::Result<()>;

    fn set_priority(&mut self, priority: Priority) -> rustix::io::Result<()>;

    /// an empty slice cancels the standing request
    fn request_performance(&mut self, frames: &[FrameLoad]) -> rustix::io::Result<()>;

    /// a new context on the same device node
    fn open_sibling(&self) -> rustix::io::Result<Box<dyn OneShotDevice>>;
}

/// `/dev/fimg2d` and its relatives
pub struct Fimg2dDevice {
    fd: OwnedFd,
    path: PathBuf,
    sources: Vec<uapi::Image>,
}

impl fmt::Debug for Fimg2dDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fimg2dDevice").field("fd", &self.fd).field("path", &self.path).finish_non_exhaustive()
    }
}

impl Fimg2dDevice {
    pub fn open(path: impl AsRef<Path>) -> rustix::io::Result<Self> {
        let path = path.as_ref();
        let fd = rustix::fs::open(path, OFlags::RDWR | OFlags::CLOEXEC, Mode::empty())?;
        tracing::debug!("opened {}", path.display());
        Ok(Self { fd, path: path.to_owned(), sources: Vec::new() })
    }
}

impl OneShotDevice for Fimg2dDevice {
    fn process(&mut self, job: &mut Job) -> rustix::io::Result<()> {
        self.sources.clear();
        self.sources.extend(job.sources.iter().map(raw_image));

        let mut raw = uapi::Job {
            target: raw_image(&job.target),
            sources: self.sources.as_mut_ptr(),
            flags: job.flags.bits(),
            num_sources: job.sources.len() as u8,
            ..Default::default()
        };

        // SAFETY: `raw.sources` points into `self.sources` which outlives the call,
        // every descriptor is borrowed from `job` which is alive as well
        unsafe { uapi::process(&self.fd, &mut raw)? };

        job.flags = JobFlags::from_bits_truncate(raw.flags);
        harvest_release(&mut job.target, &raw.target);
        for (image, raw) in job.sources.iter_mut().zip(&self.sources) {
            harvest_release(image, raw);
        }
        Ok(())
    }

    fn wait(&mut self, job: &mut Job) -> rustix::io::Result<()> {
        let mut raw = uapi::Job {
            sources: self.sources.as_mut_ptr(),
            num_sources: self.sources.len() as u8,
            ..Default::default()
        };

        // SAFETY: same descriptor array as the last submission, nothing else is read
        match unsafe { uapi::wait_process(&self.fd, &mut raw) } {
            // NOTE: #1 nothing was pending
            Ok(()) | Err(Errno::AGAIN) => {}
            Err(errno) => return Err(errno),
        }
        job.flags = JobFlags::from_bits_truncate(raw.flags);
        Ok(())
    }

    fn set_priority(&mut self, priority: Priority) -> rustix::io::Result<()> {
        let value = match priority {
            Priority::Default => uapi::PRIORITY_DEFAULT,
            Priority::Low => uapi::PRIORITY_LOW,
            Priority::Medium => uapi::PRIORITY_MEDIUM,
            Priority::High => uapi::PRIORITY_HIGH,
            Priority::Highest => uapi::PRIORITY_HIGHEST,
        };
        uapi::set_priority(&self.fd, value)
    }

    fn request_performance(&mut self, frames: &[FrameLoad]) -> rustix::io::Result<()> {
        let mut data = uapi::PerfData { num_frames: frames.len() as u32, ..Default::default() };

        for (raw, frame) in data.frame.iter_mut().zip(frames) {
            raw.num_layers = frame.layers.len() as u32;
            for (raw, layer) in raw.layer.iter_mut().zip(&frame.layers) {
                raw.pixelcount = layer.pixelcount;
                if layer.rotated {
                    raw.layer_attr |= uapi::PERF_LAYER_ROTATE;
                }
            }
            raw.frame_rate = frame.frame_rate;
            raw.bandwidth_read = frame.bandwidth_read;
            raw.bandwidth_write = frame.bandwidth_write;
            raw.target_pixelcount = frame.target_pixelcount;
            if frame.solid_color_fill {
                raw.frame_attr |= uapi::PERF_FRAME_SOLIDCOLORFILL;
            }
        }

        uapi::request_performance(&self.fd, &data)
    }

    fn open_sibling(&self) -> rustix::io::Result<Box<dyn OneShotDevice>> {
        Ok(Box::new(Fimg2dDevice::open(&self.path)?))
    }
}

fn raw_rect(rect: Rect) -> uapi::Rect {
    let short = |value: u32| i16::try_from(value).unwrap_or(i16::MAX);
    let ushort = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
    uapi::Rect {
        left: short(rect.pos.hori),
        top: short(rect.pos.vert),
        width: ushort(rect.size.hori),
        height: ushort(rect.size.vert),
    }
}

fn raw_image(image: &JobImage) -> uapi::Image {
    let mut raw = uapi::Image {
        flags: image.flags.bits(),
        fence: image.acquire.as_ref().map_or(-1, AsRawFd::as_raw_fd),
        memory: match image.memory {
            None => uapi::BUFTYPE_EMPTY,
            Some(MemoryType::Dmabuf) => uapi::BUFTYPE_DMABUF,
            Some(MemoryType::UserPtr) => uapi::BUFTYPE_USERPTR,
        },
        num_planes: image.planes.len() as u8,
        fmt: uapi::Format {
            width: image.width,
            height: image.height,
            pixelformat: image.fourcc,
            crop: raw_rect(image.crop),
            window: raw_rect(image.window),
        },
        ext: uapi::Extra {
            fillcolor: image.fill_color,
            transform: image.transform,
            composit_mode: image.blend,
            galpha: image.alpha,
            scaler_filter: image.filter,
            ..Default::default()
        },
        colorspace: image.colorspace,
        ..Default::default()
    };

    for (raw, plane) in raw.plane.iter_mut().zip(&image.planes) {
        raw.m = match plane.handle {
            BufferHandle::Dmabuf(fd) => uapi::BufferHandle { fd },
            BufferHandle::UserPtr(addr) => uapi::BufferHandle { userptr: addr as c_ulong },
        };
        raw.offset = plane.offset;
        raw.length = plane.length;
        raw.payload = plane.payload;
    }
    raw
}

fn harvest_release(image: &mut JobImage, raw: &uapi::Image) {
    if image.flags.contains(ImageFlags::RELEASE_FENCE) && raw.fence >= 0 {
        // SAFETY: the kernel hands over a new descriptor for every requested release fence
        image.release = Some(unsafe { OwnedFd::from_raw_fd(raw.fence) });
    }
}

/// a compositor on a fimg2d context
#[derive(Debug)]
pub struct G2dCompositor {
    scene: Scene,
    device: Box<dyn OneShotDevice>,
    allocator: Arc<dyn BufferAllocator>,
    job: Job,
    submission: Submission,
}

impl G2dCompositor {
    pub fn new(
        capability: &'static Capability,
        device: Box<dyn OneShotDevice>,
        allocator: Arc<dyn BufferAllocator>,
    ) -> Self {
        Self { scene: Scene::new(capability), device, allocator, job: Job::default(), submission: Submission::default() }
    }

    pub fn set_prescale_enabled(&mut self, enabled: bool) {
        self.scene.set_prescale_enabled(enabled);
    }

    fn validate(&self) -> Result<()> {
        self.scene.validate()?;

        let count = self.scene.layers().len() + self.scene.background_color().is_some() as usize;
        let max = self.scene.capability().max_layers;
        if count > max as usize {
            return Err(Error::TooManyLayers { count, max });
        }
        Ok(())
    }

    fn run(&mut self, release_fences: &mut [Option<OwnedFd>], nonblocking: bool) -> Result<()> {
        if let Err(err) = self.validate() {
            fence::clear_slots(release_fences);
            return Err(err);
        }

        if let Err(err) = self.submit_job(release_fences, nonblocking) {
            if err.is_retryable() {
                tracing::debug!("g2d busy, acquire fences are dropped");
            } else {
                tracing::error!("g2d job failed: {err}");
            }
            self.job.drop_acquire_fences();
            self.scene.invalidate_fences();
            fence::clear_slots(release_fences);
            return Err(err);
        }
        Ok(())
    }

    fn submit_job(&mut self, release_fences: &mut [Option<OwnedFd>], nonblocking: bool) -> Result<()> {
        let background = self.scene.background_color();
        self.job.reset(self.scene.layers().len() + background.is_some() as usize)?;
        self.scene.sort_layers();

        let stage = Stage {
            capability: self.scene.capability(),
            prescale: self.scene.prescale_enabled(),
            priority: self.scene.priority(),
            device: self.device.as_ref(),
            allocator: &self.allocator,
        };
        let (canvas, layers) = self.scene.parts_mut();

        let fence = canvas.take_fence();
        self.job.target = JobImage::from_canvas(canvas, fence);
        // NOTE: #2 the output is always premultiplied
        self.job.target.flags |= ImageFlags::PREMUL_ALPHA;

        if let Some(color) = background {
            self.job.sources.push(JobImage::color_fill(color.to_argb8888(), canvas));
        }

        for layer in layers.iter_mut() {
            let image = stage.prepare_source(canvas, layer)?;
            self.job.sources.push(image);
        }

        // color fills neither wait nor signal
        let acquire: Vec<bool> =
            self.job.images().filter(|image| image.memory.is_some()).map(|image| image.acquire.is_some()).collect();
        let release = fence::negotiate(&acquire, release_fences.len());
        for (image, release) in self.job.images_mut().filter(|image| image.memory.is_some()).zip(release) {
            image.flags.set(ImageFlags::RELEASE_FENCE, release);
        }

        if nonblocking {
            self.job.flags |= JobFlags::NONBLOCK;
        }

        self.device.process(&mut self.job).map_err(|errno| Error::device("process", errno))?;
        self.job.drop_acquire_fences();

        if self.job.flags.contains(JobFlags::ERROR) {
            return Err(Error::Processing);
        }

        self.scene.finish_execution();
        fence::fill_slots(release_fences, self.job.take_release_fences());
        tracing::trace!("submitted {} sources to g2d", self.job.sources.len());
        Ok(())
    }
}

/// what every source of one job shares
struct Stage<'a> {
    capability: &'static Capability,
    prescale: bool,
    priority: Priority,
    device: &'a dyn OneShotDevice,
    allocator: &'a Arc<dyn BufferAllocator>,
}

impl Stage<'_> {
    fn prepare_source(&self, canvas: &Canvas, layer: &mut Layer) -> Result<JobImage> {
        let target = layer.target_rect(canvas.dimension());
        let mut transform = layer.transform();

        let resample = self.prescale
            && !layer.attr().contains(LayerAttr::NO_RESAMPLING)
            && !self.capability.supports_resampling(layer.image_rect().size, target.size, transform);

        let mut image = if resample {
            let (image, applied) = self.prescale_source(canvas, layer, target.size)?;
            if applied {
                transform = Transform::empty();
            }
            image
        } else {
            let fence = layer.canvas_mut().take_fence();
            let mut image = JobImage::from_canvas(layer.canvas(), fence);
            let crop = layer.image_rect();
            let format = layer.canvas().format();
            image.crop = crop;
            for (index, plane) in image.planes.iter_mut().enumerate() {
                plane.payload = format.plane_length(index, image.width, crop.pos.vert + crop.size.vert);
            }
            image
        };

        image.transform = job_transform(transform);
        image.window = target;
        image.flags |= ImageFlags::GLOBAL_ALPHA | ImageFlags::PREMUL_ALPHA;
        image.alpha = layer.plane_alpha();
        image.blend = job_blend(layer.blend());
        image.filter = uapi::SCALER_FILTER_BILINEAR;
        Ok(image)
    }

    /// the intermediate image, and whether it is already transformed
    fn prescale_source(&self, canvas: &Canvas, layer: &mut Layer, target: Coord) -> Result<(JobImage, bool)> {
        let plan = prescale::plan(self.capability, layer, canvas, target);

        let mut transit = match layer.transit_slot().take() {
            Some(transit) => transit,
            None => Box::new(self.new_transit()?),
        };

        let result = transit.run(&plan, layer, self.allocator.as_ref());
        let image = result.map(|fence| JobImage::from_canvas(transit.engine().scene().canvas(), fence));
        let applied = transit.applies_transform();
        *layer.transit_slot() = Some(transit);

        Ok((image?, applied))
    }

    fn new_transit(&self) -> Result<Transit> {
        let device = self.device.open_sibling().map_err(|errno| Error::device("open prescaler", errno))?;
        let mut prescaler = G2dCompositor::new(self.capability, device, self.allocator.clone());

        if self.priority != Priority::Default {
            if let Err(err) = prescaler.prioritize(self.priority) {
                tracing::error!("failed to configure priority {:?} to a new prescaler: {err}", self.priority);
                return Err(err);
            }
        }
        Transit::new(Blitter::G2d(prescaler))
    }
}

impl Compositor for G2dCompositor {
    fn scene(&self) -> &Scene {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn execute(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()> {
        self.run(release_fences, true)
    }

    fn submit(&mut self) -> Result<ExecHandle> {
        self.run(&mut [], true)?;
        Ok(self.submission.issue())
    }

    fn execute_blocking(&mut self) -> Result<()> {
        self.run(&mut [], false)
    }

    fn wait_execution(&mut self, handle: ExecHandle) -> Result<()> {
        self.submission.complete(handle);
        self.wait_idle()
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device.wait(&mut self.job).map_err(|errno| Error::device("wait", errno))?;
        if self.job.flags.contains(JobFlags::ERROR) {
            tracing::error!("g2d reported an error on the previous job");
            return Err(Error::Processing);
        }
        Ok(())
    }

    fn prioritize(&mut self, priority: Priority) -> Result<Prioritized> {
        let previous = self.scene.priority();
        if priority == previous {
            return Ok(Prioritized::Applied);
        }

        let mut outcome = match self.device.set_priority(priority) {
            Ok(()) => Prioritized::Applied,
            Err(Errno::BUSY) => {
                tracing::debug!("g2d busy, priority {priority:?} applies after the queued job");
                Prioritized::Pending
            }
            Err(errno) => return Err(Error::device("set priority", errno)),
        };

        let (_, layers) = self.scene.parts_mut();
        for index in 0..layers.len() {
            let Some(transit) = layers[index].transit_mut() else {
                continue;
            };
            match transit.engine_mut().prioritize(priority) {
                Ok(Prioritized::Applied) => {}
                Ok(Prioritized::Pending) => outcome = Prioritized::Pending,
                Err(err) => {
                    tracing::error!("failed to configure priority {priority:?} to the prescaler of {}", layers[index].id());
                    rollback(&mut layers[..index], previous);
                    match self.device.set_priority(previous) {
                        Ok(()) | Err(Errno::BUSY) => {}
                        Err(errno) => tracing::error!("failed to revert g2d priority to {previous:?}: {errno}"),
                    }
                    return Err(err);
                }
            }
        }

        self.scene.set_priority(priority);
        Ok(outcome)
    }

    fn request_performance_qos(&mut self, request: Option<&PerformanceRequest>) -> Result<()> {
        let frames: Vec<FrameLoad> = match request {
            Some(request) if !request.is_empty() => {
                request.check()?;
                request.frames.iter().map(perf::estimate).collect()
            }
            _ => Vec::new(),
        };

        self.device
            .request_performance(&frames)
            .map_err(|errno| Error::device("request performance", errno))?;

        if frames.is_empty() {
            tracing::debug!("performance request cancelled");
        } else {
            tracing::debug!("requested performance for {} frames", frames.len());
        }
        Ok(())
    }
}

/// best effort, failures are only logged
fn rollback(layers: &mut [Layer], priority: Priority) {
    for layer in layers {
        let id = layer.id();
        let Some(transit) = layer.transit_mut() else {
            continue;
        };
        if let Err(err) = transit.engine_mut().prioritize(priority) {
            tracing::error!("failed to restore priority {priority:?} of the prescaler of {id}: {err}");
        }
    }
}
