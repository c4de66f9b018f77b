//! mem2mem scalers driven through a v4l2 streaming session
use blit_uapi::v4l2;
use rustix::fs::{Mode, OFlags};
use std::{
    ffi::c_ulong,
    fmt,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    path::Path,
};

use super::session::{Direction, Session, Transition};
use crate::{
    canvas::{BufferHandle, Canvas, MemoryType, Modified},
    capability::Capability,
    compositor::{Compositor, ExecHandle, Submission},
    error::{Error, Result},
    fence,
    format::{ChromaSubsampling, PixelFormat},
    geometry::{Rect, Transform},
    perf::PerformanceRequest,
    scene::Scene,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    HorizontalFlip,
    VerticalFlip,
    /// degrees, 0 or 90
    Rotate,
    ContentProtection,
    CscEquation,
    CscRange,
    FrameRate,
}

impl Control {
    const fn id(self) -> u32 {
        match self {
            Control::HorizontalFlip => v4l2::CID_HFLIP,
            Control::VerticalFlip => v4l2::CID_VFLIP,
            Control::Rotate => v4l2::CID_ROTATE,
            Control::ContentProtection => v4l2::CID_CONTENT_PROTECTION,
            Control::CscEquation => v4l2::CID_CSC_EQ,
            Control::CscRange => v4l2::CID_CSC_RANGE,
            Control::FrameRate => v4l2::CID_FRAMERATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub colorspace: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlane {
    pub handle: BufferHandle,
    pub offset: u32,
    pub length: u32,
    /// zero lets the driver decide, as for capture buffers
    pub bytesused: u32,
}

#[derive(Debug)]
pub struct StreamBuffer {
    pub memory: MemoryType,
    pub planes: Vec<StreamPlane>,
    pub acquire: Option<OwnedFd>,
    /// ask for a release fence even without an acquire fence
    pub release: bool,
}

/// a mem2mem device with one output and one capture queue
pub trait StreamDevice: fmt::Debug + Send {
    fn set_format(&mut self, direction: Direction, format: &StreamFormat) -> rustix::io::Result<()>;

    fn set_crop(&mut self, direction: Direction, crop: Rect) -> rustix::io::Result<()>;

    fn set_control(&mut self, control: Control, value: i32) -> rustix::io::Result<()>;

    fn request_buffers(&mut self, direction: Direction, count: u32, memory: MemoryType) -> rustix::io::Result<()>;

    fn stream_on(&mut self, direction: Direction) -> rustix::io::Result<()>;

    fn stream_off(&mut self, direction: Direction) -> rustix::io::Result<()>;

    /// the release fence, when one was asked for and the device produced it
    fn queue_buffer(&mut self, direction: Direction, buffer: StreamBuffer) -> rustix::io::Result<Option<OwnedFd>>;

    /// whether the device flagged the buffer as failed
    fn dequeue_buffer(&mut self, direction: Direction, memory: MemoryType) -> rustix::io::Result<bool>;
}

#[derive(Debug)]
pub struct V4l2Device {
    fd: OwnedFd,
    fence_flags: u32,
}

impl V4l2Device {
    pub fn open(path: impl AsRef<Path>) -> rustix::io::Result<Self> {
        let path = path.as_ref();
        let fd = rustix::fs::open(path, OFlags::RDWR | OFlags::CLOEXEC, Mode::empty())?;

        let fence_flags = match v4l2::query_capability(&fd) {
            Ok(caps) if caps.device_caps & v4l2::CAP_FENCES != 0 => v4l2::BUF_FLAG_IN_FENCE | v4l2::BUF_FLAG_OUT_FENCE,
            Ok(_) => v4l2::BUF_FLAG_USE_SYNC,
            Err(errno) => {
                tracing::warn!("failed to query {}: {errno}", path.display());
                v4l2::BUF_FLAG_USE_SYNC
            }
        };
        tracing::debug!("opened {}, fence flags {fence_flags:#x}", path.display());
        Ok(Self { fd, fence_flags })
    }
}

const fn v4l2_memory(memory: MemoryType) -> u32 {
    match memory {
        MemoryType::Dmabuf => v4l2::MEMORY_DMABUF,
        MemoryType::UserPtr => v4l2::MEMORY_USERPTR,
    }
}

impl StreamDevice for V4l2Device {
    fn set_format(&mut self, direction: Direction, format: &StreamFormat) -> rustix::io::Result<()> {
        let pix = v4l2::PixFormatMplane {
            width: format.width,
            height: format.height,
            pixelformat: format.format.fourcc(),
            colorspace: format.colorspace,
            ..Default::default()
        };
        v4l2::set_format(&self.fd, &mut v4l2::Format::mplane(direction.buf_type(), pix))
    }

    fn set_crop(&mut self, direction: Direction, crop: Rect) -> rustix::io::Result<()> {
        let signed = |value: u32| i32::try_from(value).unwrap_or(i32::MAX);
        let c = v4l2::Rect {
            left: signed(crop.pos.hori),
            top: signed(crop.pos.vert),
            width: crop.size.hori,
            height: crop.size.vert,
        };
        v4l2::set_crop(&self.fd, &v4l2::Crop { type_: direction.buf_type(), c })
    }

    fn set_control(&mut self, control: Control, value: i32) -> rustix::io::Result<()> {
        v4l2::set_control(&self.fd, control.id(), value)
    }

    fn request_buffers(&mut self, direction: Direction, count: u32, memory: MemoryType) -> rustix::io::Result<()> {
        let mut reqbufs = v4l2::RequestBuffers {
            count,
            type_: direction.buf_type(),
            memory: v4l2_memory(memory),
            ..Default::default()
        };
        v4l2::request_buffers(&self.fd, &mut reqbufs)
    }

    fn stream_on(&mut self, direction: Direction) -> rustix::io::Result<()> {
        v4l2::stream_on(&self.fd, direction.buf_type())
    }

    fn stream_off(&mut self, direction: Direction) -> rustix::io::Result<()> {
        v4l2::stream_off(&self.fd, direction.buf_type())
    }

    fn queue_buffer(&mut self, direction: Direction, buffer: StreamBuffer) -> rustix::io::Result<Option<OwnedFd>> {
        let mut planes: [v4l2::Plane; v4l2::VIDEO_MAX_PLANES] = Default::default();
        for (raw, plane) in planes.iter_mut().zip(&buffer.planes) {
            raw.m = match plane.handle {
                BufferHandle::Dmabuf(fd) => v4l2::PlaneMemory { fd },
                BufferHandle::UserPtr(addr) => v4l2::PlaneMemory { userptr: addr as c_ulong },
            };
            raw.length = plane.length;
            raw.bytesused = plane.bytesused;
            raw.data_offset = plane.offset;
        }

        let mut raw = v4l2::Buffer::new(direction.buf_type(), v4l2_memory(buffer.memory));
        raw.length = buffer.planes.len() as u32;
        raw.m = v4l2::BufferMemory { planes: planes.as_mut_ptr() };

        let fenced = buffer.acquire.is_some() || buffer.release;
        if let Some(acquire) = &buffer.acquire {
            raw.flags = self.fence_flags;
            raw.reserved = acquire.as_raw_fd();
        } else if buffer.release {
            raw.flags = self.fence_flags & !v4l2::BUF_FLAG_IN_FENCE;
        }

        // SAFETY: `planes` lives across the call, the descriptors are borrowed from `buffer`
        unsafe { v4l2::queue_buffer(&self.fd, &mut raw)? };

        if fenced && raw.reserved >= 0 {
            // SAFETY: after queueing, `reserved` holds a new release fence owned by the caller
            return Ok(Some(unsafe { OwnedFd::from_raw_fd(raw.reserved) }));
        }
        Ok(None)
    }

    fn dequeue_buffer(&mut self, direction: Direction, memory: MemoryType) -> rustix::io::Result<bool> {
        let mut planes: [v4l2::Plane; v4l2::VIDEO_MAX_PLANES] = Default::default();
        let mut raw = v4l2::Buffer::new(direction.buf_type(), v4l2_memory(memory));
        raw.length = planes.len() as u32;
        raw.m = v4l2::BufferMemory { planes: planes.as_mut_ptr() };

        // SAFETY: `planes` lives across the call and is only written
        unsafe { v4l2::dequeue_buffer(&self.fd, &mut raw)? };
        Ok(raw.flags & v4l2::BUF_FLAG_ERROR != 0)
    }
}

/// a single layer compositor on a streaming scaler
#[derive(Debug)]
pub struct StreamScaler {
    scene: Scene,
    device: Box<dyn StreamDevice>,
    session: Session,
    submission: Submission,
}

impl StreamScaler {
    pub fn new(capability: &'static Capability, device: Box<dyn StreamDevice>) -> Self {
        Self { scene: Scene::new(capability), device, session: Session::default(), submission: Submission::default() }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn validate(&self) -> Result<()> {
        self.scene.validate()?;
        match self.scene.layers().len() {
            1 => Ok(()),
            count => Err(Error::LayerCount { count, required: 1 }),
        }
    }

    fn run(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()> {
        if let Err(err) = self.validate() {
            fence::clear_slots(release_fences);
            return Err(err);
        }

        if let Err(err) = self.stream(release_fences) {
            if err.is_retryable() {
                tracing::debug!("scaler busy, acquire fences are dropped");
            } else {
                tracing::error!("scaler job failed: {err}");
            }
            self.scene.invalidate_fences();
            fence::clear_slots(release_fences);
            return Err(err);
        }
        Ok(())
    }

    fn stream(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()> {
        if self.dequeue_pending()? {
            tracing::warn!("previous scaler job failed");
        }

        self.apply_transform()?;
        if self.needs_reset() {
            self.reset();
            self.configure_csc()?;
        }
        for direction in Direction::ALL {
            self.configure(direction)?;
        }
        self.apply_protection()?;
        for direction in Direction::ALL {
            self.bind(direction)?;
        }

        let source_crop = self.session.crop(Direction::Source);
        let (canvas, layers) = self.scene.parts_mut();
        let layer = &mut layers[0];

        let acquire = [canvas.fence().is_some(), layer.canvas().fence().is_some()];
        let release = fence::negotiate(&acquire, release_fences.len());
        let (target_release, source_release) = (release[0], release[1]);

        let source = stream_buffer(layer.canvas_mut(), source_release, Some(source_crop.size.vert));
        let source_fence = self
            .device
            .queue_buffer(Direction::Source, source)
            .map_err(|errno| Error::device("queue source", errno))?;
        self.session.advance(Direction::Source, Transition::Queue);

        let target = stream_buffer(canvas, target_release, None);
        let target_fence = match self.device.queue_buffer(Direction::Target, target) {
            Ok(fence) => fence,
            Err(errno) => {
                // NOTE: #1 the source is queued alone, only a reset brings both queues back in step
                drop(source_fence);
                self.reset();
                return Err(Error::device("queue target", errno));
            }
        };
        self.session.advance(Direction::Target, Transition::Queue);

        self.scene.finish_execution();
        fence::fill_slots(release_fences, target_fence.into_iter().chain(source_fence));
        tracing::trace!("queued one frame to the scaler");
        Ok(())
    }

    /// dequeue both directions if a frame is in flight, true when the device flagged it failed
    fn dequeue_pending(&mut self) -> Result<bool> {
        let Some(queued) = self.session.queued() else {
            // NOTE: #2 only a failed release leaves one queue behind, start over from both unbound
            tracing::warn!("scaler queues out of step, resetting: {:?}", self.session);
            self.reset();
            return match self.session.queued() {
                Some(_) => Ok(false),
                None => Err(Error::device("resync queues", rustix::io::Errno::IO)),
            };
        };
        if !queued {
            return Ok(false);
        }

        let mut failed = false;
        for direction in Direction::ALL {
            let Some(memory) = self.session.memory(direction) else {
                continue;
            };
            failed |= self
                .device
                .dequeue_buffer(direction, memory)
                .map_err(|errno| Error::device("dequeue", errno))?;
            self.session.advance(direction, Transition::Dequeue);
        }
        Ok(failed)
    }

    /// send the controls of the transform bits that changed
    fn apply_transform(&mut self) -> Result<()> {
        let transform = self.scene.layers()[0].transform();
        let diff = self.session.transform() ^ transform;

        let controls = [
            (Transform::FLIP_H, Control::HorizontalFlip, 1),
            (Transform::FLIP_V, Control::VerticalFlip, 1),
            (Transform::ROT_90, Control::Rotate, 90),
        ];
        for (bit, control, value) in controls {
            if diff.contains(bit) {
                let value = if transform.contains(bit) { value } else { 0 };
                self.device
                    .set_control(control, value)
                    .map_err(|errno| Error::device("set transform", errno))?;
            }
        }

        self.session.set_transform(transform);
        Ok(())
    }

    /// whether the negotiated formats and crops no longer describe the frame
    fn needs_reset(&mut self) -> bool {
        let canvas = self.scene.canvas();
        let layer = &self.scene.layers()[0];
        let reformat = Modified::TYPE | Modified::DIMENSION;

        let transform_changed = self.session.take_transform_changed();
        transform_changed
            || layer.target_rect(canvas.dimension()) != self.session.crop(Direction::Target)
            || layer.image_rect() != self.session.crop(Direction::Source)
            || canvas.modified().intersects(reformat)
            || layer.canvas().modified().intersects(reformat)
    }

    /// best effort, a direction failing to reset is only logged
    fn reset(&mut self) {
        for direction in Direction::ALL {
            if let Err(err) = self.reset_direction(direction) {
                tracing::error!("failed to reset the {direction} queue: {err}");
            }
        }
    }

    fn reset_direction(&mut self, direction: Direction) -> Result<()> {
        if !self.session.state(direction).is_bound() {
            return Ok(());
        }
        if let Err(errno) = self.device.stream_off(direction) {
            tracing::error!("stream off of the {direction} queue failed, releasing buffers anyway: {errno}");
        }
        let memory = self.session.memory(direction).unwrap_or(MemoryType::Dmabuf);
        self.device
            .request_buffers(direction, 0, memory)
            .map_err(|errno| Error::device("release buffers", errno))?;
        self.session.advance(direction, Transition::Reset);
        self.session.set_memory(direction, None);
        tracing::debug!("{direction} queue released");
        Ok(())
    }

    /// colorspace conversion between the rgb and the yuv side
    fn configure_csc(&mut self) -> Result<()> {
        let canvas = self.scene.canvas();
        let source = self.scene.layers()[0].canvas();
        let is_rgb = |canvas: &Canvas| canvas.format().chroma_subsampling() == ChromaSubsampling::NONE;

        // the yuv side decides the equation
        let yuv = match (is_rgb(source), is_rgb(canvas)) {
            (true, false) => canvas,
            (false, true) => source,
            _ => return Ok(()),
        };
        let size = yuv.dimension();
        let (equation, full) = csc(yuv.dataspace().v4l2_colorspace(size.hori, size.vert));

        self.device
            .set_control(Control::CscEquation, equation as i32)
            .and_then(|()| self.device.set_control(Control::CscRange, full as i32))
            .map_err(|errno| Error::device("configure csc", errno))
    }

    /// format and crop of an unbound direction
    fn configure(&mut self, direction: Direction) -> Result<()> {
        if self.session.state(direction).is_bound() {
            return Ok(());
        }

        let canvas = self.scene.canvas();
        let layer = &self.scene.layers()[0];
        let (image, crop) = match direction {
            Direction::Source => (layer.canvas(), layer.image_rect()),
            Direction::Target => (canvas, layer.target_rect(canvas.dimension())),
        };
        let size = image.dimension();
        let format = StreamFormat {
            width: size.hori,
            height: size.vert,
            format: image.format(),
            colorspace: image.dataspace().v4l2_colorspace(size.hori, size.vert),
        };
        let memory = image.memory_type();

        self.device
            .set_format(direction, &format)
            .map_err(|errno| Error::device("set format", errno))?;
        self.device
            .set_crop(direction, crop)
            .map_err(|errno| Error::device("set crop", errno))?;

        self.session.set_crop(direction, crop);
        self.session.set_memory(direction, memory);
        tracing::debug!("{direction} configured to {format:?} cropped to {crop}");
        Ok(())
    }

    fn apply_protection(&mut self) -> Result<()> {
        let protected = self.scene.layers()[0].canvas().is_protected() || self.scene.canvas().is_protected();
        if protected == self.session.is_protected() {
            return Ok(());
        }
        self.device
            .set_control(Control::ContentProtection, protected as i32)
            .map_err(|errno| Error::device("set content protection", errno))?;
        self.session.set_protected(protected);
        Ok(())
    }

    /// one buffer and streaming on an unbound direction
    fn bind(&mut self, direction: Direction) -> Result<()> {
        if self.session.state(direction).is_bound() {
            return Ok(());
        }
        let memory = self.session.memory(direction).unwrap_or(MemoryType::Dmabuf);

        self.device
            .request_buffers(direction, 1, memory)
            .map_err(|errno| Error::device("request buffers", errno))?;
        if let Err(errno) = self.device.stream_on(direction) {
            if let Err(errno) = self.device.request_buffers(direction, 0, memory) {
                tracing::error!("failed to release the {direction} buffers: {errno}");
            }
            return Err(Error::device("stream on", errno));
        }
        self.session.advance(direction, Transition::RequestBuffers);
        Ok(())
    }
}

/// `height` limits the payload of source planes to the rows the crop reaches
fn stream_buffer(canvas: &mut Canvas, release: bool, height: Option<u32>) -> StreamBuffer {
    let acquire = canvas.take_fence();
    let format = canvas.format();
    let width = canvas.dimension().hori;
    let planes = canvas
        .planes()
        .iter()
        .enumerate()
        .map(|(index, plane)| StreamPlane {
            handle: plane.handle,
            offset: plane.offset,
            length: plane.length,
            bytesused: height.map_or(0, |height| format.plane_length(index, width, height)),
        })
        .collect();

    StreamBuffer {
        memory: canvas.memory_type().unwrap_or(MemoryType::Dmabuf),
        planes,
        acquire,
        release,
    }
}

/// the scaler takes the equation and the range separately
const fn csc(colorspace: u32) -> (u32, bool) {
    match colorspace {
        v4l2::COLORSPACE_SRGB => (v4l2::COLORSPACE_REC709, true),
        v4l2::COLORSPACE_JPEG => (v4l2::COLORSPACE_SMPTE170M, true),
        other => (other, false),
    }
}

impl Compositor for StreamScaler {
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
        assert!(
            self.submission.pending().is_none(),
            "submitting to the scaler before waiting on {:?}",
            self.submission.pending()
        );
        self.run(&mut [])?;
        Ok(self.submission.issue())
    }

    fn execute_blocking(&mut self) -> Result<()> {
        self.run(&mut [])?;
        self.wait_idle()
    }

    fn wait_execution(&mut self, handle: ExecHandle) -> Result<()> {
        self.submission.complete(handle);
        self.wait_idle()
    }

    fn wait_idle(&mut self) -> Result<()> {
        if self.dequeue_pending()? {
            tracing::error!("scaler reported an error on the previous frame");
            return Err(Error::Processing);
        }
        Ok(())
    }

    fn request_performance_qos(&mut self, request: Option<&PerformanceRequest>) -> Result<()> {
        let frame_rate = request.and_then(|request| request.frames.first()).map_or(0, |frame| frame.frame_rate);
        if let Err(errno) = self.device.set_control(Control::FrameRate, frame_rate as i32) {
            tracing::debug!("scaler ignored frame rate {frame_rate}: {errno}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            mock::{Call, MockDevices},
            session::BindState,
        },
        canvas::{CanvasAttr, Plane},
        capability::MSCL_9810,
        dataspace::Dataspace,
        fence::dummy_fence,
        geometry::Coord,
        perf::PerformanceFrame,
        scene::tests::configure_canvas,
    };

    fn scaler(devices: &MockDevices) -> StreamScaler {
        let mut scaler = StreamScaler::new(&MSCL_9810, devices.stream());
        configure_canvas(scaler.canvas_mut(), 1920, 1080, 10);
        let id = scaler.create_layer().unwrap();
        configure_canvas(scaler.layer_mut(id).unwrap().canvas_mut(), 640, 480, 11);
        scaler
    }

    fn position(calls: &[Call], call: &Call) -> usize {
        calls.iter().position(|c| c == call).unwrap_or_else(|| panic!("{call:?} not in {calls:?}"))
    }

    #[test]
    fn first_frame_binds_both_directions() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        scaler.execute(&mut []).unwrap();

        let calls = devices.calls_of(0);
        let format = position(&calls, &Call::SetFormat(Direction::Source, PixelFormat::Rgba8888));
        assert!(format < position(&calls, &Call::RequestBuffers(Direction::Source, 1)));
        assert!(position(&calls, &Call::StreamOn(Direction::Target)) < position(&calls, &Call::Queue(Direction::Source)));
        assert!(!calls.iter().any(|call| matches!(call, Call::StreamOff(_))));
        assert_eq!(scaler.session().state(Direction::Source), BindState::Queued);
        assert_eq!(scaler.session().state(Direction::Target), BindState::Queued);
    }

    #[test]
    fn unchanged_frame_keeps_the_session() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        scaler.execute(&mut []).unwrap();
        let first = devices.calls_of(0).len();

        scaler.execute(&mut []).unwrap();
        let calls = &devices.calls_of(0)[first..];
        assert_eq!(
            calls,
            [
                Call::Dequeue(Direction::Source),
                Call::Dequeue(Direction::Target),
                Call::Queue(Direction::Source),
                Call::Queue(Direction::Target),
            ]
        );
    }

    #[test]
    fn format_change_resets_before_rebinding() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        scaler.execute(&mut []).unwrap();
        let first = devices.calls_of(0).len();

        scaler.canvas_mut().set_image_type(PixelFormat::Nv12, Dataspace::UNKNOWN);
        scaler.execute(&mut []).unwrap();

        let calls = &devices.calls_of(0)[first..];
        let format = position(calls, &Call::SetFormat(Direction::Target, PixelFormat::Nv12));
        for direction in Direction::ALL {
            let off = position(calls, &Call::StreamOff(direction));
            let release = position(calls, &Call::RequestBuffers(direction, 0));
            assert!(off < release && release < format);
        }
        // rgb to yuv takes the equation from the target, unknown at 1080p is bt709
        assert!(calls.contains(&Call::SetControl(Control::CscEquation, v4l2::COLORSPACE_REC709 as i32)));
        assert!(calls.contains(&Call::SetControl(Control::CscRange, 0)));
    }

    #[test]
    fn transform_controls_follow_changed_bits() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        let id = scaler.scene().layers()[0].id();
        scaler.layer_mut(id).unwrap().set_transform(Transform::ROT_90 | Transform::FLIP_H);
        scaler.layer_mut(id).unwrap().set_target_rect(Rect::new(0, 0, 480, 640));
        scaler.execute(&mut []).unwrap();

        let controls: Vec<Call> =
            devices.calls_of(0).into_iter().filter(|call| matches!(call, Call::SetControl(..))).collect();
        assert_eq!(
            controls,
            [Call::SetControl(Control::HorizontalFlip, 1), Call::SetControl(Control::Rotate, 90)]
        );

        let first = devices.calls_of(0).len();
        scaler.layer_mut(id).unwrap().set_transform(Transform::ROT_90);
        scaler.execute(&mut []).unwrap();
        let calls = &devices.calls_of(0)[first..];
        assert!(calls.contains(&Call::SetControl(Control::HorizontalFlip, 0)));
        assert!(!calls.iter().any(|call| matches!(call, Call::SetControl(Control::Rotate, _))));
        // a changed transform renegotiates
        assert!(calls.contains(&Call::StreamOff(Direction::Source)));
    }

    #[test]
    fn fences_are_negotiated_target_first() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        let id = scaler.scene().layers()[0].id();
        scaler.layer_mut(id).unwrap().canvas_mut().set_fence(Some(dummy_fence()));

        let mut slots = [None, None, None];
        scaler.execute(&mut slots).unwrap();

        assert!(slots[0].is_some() && slots[1].is_some());
        assert!(slots[2].is_none());
        assert!(scaler.scene().layers()[0].canvas().fence().is_none());
        let queued = devices.queued_buffers();
        assert_eq!(queued, [(Direction::Source, true, true), (Direction::Target, false, true)]);
    }

    #[test]
    fn failed_target_queue_resets_the_session() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        scaler.canvas_mut().set_fence(Some(dummy_fence()));
        devices.script().failing_queue = Some(Direction::Target);

        let mut slots = [Some(dummy_fence())];
        assert!(scaler.execute(&mut slots).is_err());
        assert!(slots[0].is_none());
        assert!(scaler.scene().canvas().fence().is_none());
        for direction in Direction::ALL {
            assert_eq!(scaler.session().state(direction), BindState::Unbound);
        }

        devices.script().failing_queue = None;
        scaler.execute(&mut []).unwrap();
        assert_eq!(scaler.session().state(Direction::Target), BindState::Queued);
    }

    #[test]
    fn half_reset_session_recovers_on_the_next_frame() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        devices.script().failing_queue = Some(Direction::Target);
        devices.script().failing_release = Some(Direction::Source);

        assert!(matches!(scaler.execute(&mut []), Err(Error::Device { op: "queue target", .. })));
        assert_eq!(scaler.session().state(Direction::Source), BindState::Queued);
        assert_eq!(scaler.session().state(Direction::Target), BindState::Unbound);

        devices.script().failing_queue = None;
        assert!(matches!(scaler.execute(&mut []), Err(Error::Device { op: "resync queues", .. })));
        assert_eq!(scaler.session().state(Direction::Source), BindState::Queued);

        devices.script().failing_release = None;
        scaler.execute(&mut []).unwrap();
        for direction in Direction::ALL {
            assert_eq!(scaler.session().state(direction), BindState::Queued);
        }
        let calls = devices.calls_of(0);
        let released = calls.iter().filter(|call| **call == Call::RequestBuffers(Direction::Source, 0)).count();
        assert_eq!(released, 3);
    }

    #[test]
    fn exactly_one_layer() {
        let devices = MockDevices::default();
        let mut scaler = StreamScaler::new(&MSCL_9810, devices.stream());
        configure_canvas(scaler.canvas_mut(), 64, 64, 10);
        assert!(matches!(scaler.execute(&mut []), Err(Error::LayerCount { count: 0, required: 1 })));
        assert!(devices.calls().is_empty());
    }

    #[test]
    fn protection_is_sent_on_change_only() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        scaler.execute(&mut []).unwrap();
        scaler.execute(&mut []).unwrap();
        let protection = |call: &Call| matches!(call, Call::SetControl(Control::ContentProtection, _));
        assert!(!devices.calls_of(0).iter().any(protection));

        let id = scaler.scene().layers()[0].id();
        let canvas = scaler.layer_mut(id).unwrap().canvas_mut();
        let len = PixelFormat::Rgba8888.plane_length(0, 640, 480);
        canvas.set_buffer(&[Plane::dmabuf(11, 0, len)], None, CanvasAttr::PROTECTED).unwrap();
        scaler.execute(&mut []).unwrap();
        assert!(devices.calls_of(0).contains(&Call::SetControl(Control::ContentProtection, 1)));
    }

    #[test]
    fn flagged_frame_surfaces_on_wait() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        let handle = scaler.submit().unwrap();
        devices.script().processing_error = true;
        assert!(matches!(scaler.wait_execution(handle), Err(Error::Processing)));
        assert_eq!(scaler.session().queued(), Some(false));
    }

    #[test]
    #[should_panic]
    fn second_submit_before_wait_is_fatal() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        let _handle = scaler.submit().unwrap();
        let _ = scaler.submit();
    }

    #[test]
    fn frame_rate_request() {
        let devices = MockDevices::default();
        let mut scaler = scaler(&devices);
        let request = PerformanceRequest {
            frames: vec![PerformanceFrame::new(Coord::new(1920, 1080), PixelFormat::Rgba8888, 60)],
        };
        scaler.request_performance_qos(Some(&request)).unwrap();
        scaler.request_performance_qos(None).unwrap();
        assert_eq!(
            devices.calls_of(0),
            [Call::SetControl(Control::FrameRate, 60), Call::SetControl(Control::FrameRate, 0)]
        );
    }

    #[test]
    fn csc_splits_range() {
        assert_eq!(csc(v4l2::COLORSPACE_SRGB), (v4l2::COLORSPACE_REC709, true));
        assert_eq!(csc(v4l2::COLORSPACE_REC709), (v4l2::COLORSPACE_REC709, false));
        assert_eq!(csc(v4l2::COLORSPACE_JPEG), (v4l2::COLORSPACE_SMPTE170M, true));
        assert_eq!(csc(v4l2::COLORSPACE_BT2020), (v4l2::COLORSPACE_BT2020, false));
    }
}
