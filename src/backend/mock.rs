//! scripted devices recording every call they receive
use rustix::io::{Errno, Result};
use std::{
    os::fd::OwnedFd,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use super::{
    g2d::OneShotDevice,
    job::{ImageFlags, Job, JobFlags},
    scaler::{Control, StreamBuffer, StreamDevice, StreamFormat},
    session::Direction,
};
use crate::{
    canvas::MemoryType, compositor::Priority, fence::dummy_fence, format::PixelFormat, geometry::Rect,
    perf::FrameLoad,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Process { release: Vec<bool>, nonblocking: bool },
    Wait,
    SetPriority(Priority),
    RequestPerformance(usize),

    SetFormat(Direction, PixelFormat),
    SetCrop(Direction, Rect),
    SetControl(Control, i32),
    RequestBuffers(Direction, u32),
    StreamOn(Direction),
    StreamOff(Direction),
    Queue(Direction),
    Dequeue(Direction),
}

#[derive(Debug, Default)]
pub struct Script {
    /// every submission and priority change fails with `EBUSY`
    pub busy: bool,
    /// jobs complete with the error flag
    pub processing_error: bool,
    /// device ids whose priority change fails
    pub failing_priority: Vec<usize>,
    pub failing_queue: Option<Direction>,
    /// releasing the buffers of this direction fails with `EIO`
    pub failing_release: Option<Direction>,
}

#[derive(Debug, Default)]
struct Shared {
    calls: Mutex<Vec<(usize, Call)>>,
    queued: Mutex<Vec<(Direction, bool, bool)>>,
    script: Mutex<Script>,
    next_id: AtomicUsize,
}

/// hands out devices sharing one call log, ids count up from 0 in creation order
#[derive(Debug, Clone, Default)]
pub struct MockDevices {
    shared: Arc<Shared>,
}

impl MockDevices {
    pub fn one_shot(&self) -> Box<dyn OneShotDevice> {
        Box::new(self.device())
    }

    pub fn stream(&self) -> Box<dyn StreamDevice> {
        Box::new(self.device())
    }

    fn device(&self) -> MockDevice {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        MockDevice { id, shared: self.shared.clone() }
    }

    pub fn calls(&self) -> Vec<(usize, Call)> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, id: usize) -> Vec<Call> {
        self.calls().into_iter().filter(|(device, _)| *device == id).map(|(_, call)| call).collect()
    }

    /// `(direction, has acquire fence, wants release fence)` of every queued buffer
    pub fn queued_buffers(&self) -> Vec<(Direction, bool, bool)> {
        self.shared.queued.lock().unwrap().clone()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.shared.script.lock().unwrap()
    }
}

#[derive(Debug)]
struct MockDevice {
    id: usize,
    shared: Arc<Shared>,
}

impl MockDevice {
    fn record(&self, call: Call) {
        self.shared.calls.lock().unwrap().push((self.id, call));
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.shared.script.lock().unwrap()
    }

    fn busy(&self) -> Result<()> {
        if self.script().busy { Err(Errno::BUSY) } else { Ok(()) }
    }
}

impl OneShotDevice for MockDevice {
    fn process(&mut self, job: &mut Job) -> Result<()> {
        let release = job.images().map(|image| image.flags.contains(ImageFlags::RELEASE_FENCE)).collect();
        self.record(Call::Process { release, nonblocking: job.flags.contains(JobFlags::NONBLOCK) });
        self.busy()?;

        for image in job.images_mut().filter(|image| image.flags.contains(ImageFlags::RELEASE_FENCE)) {
            image.release = Some(dummy_fence());
        }
        job.flags.set(JobFlags::ERROR, self.script().processing_error);
        Ok(())
    }

    fn wait(&mut self, job: &mut Job) -> Result<()> {
        self.record(Call::Wait);
        job.flags.set(JobFlags::ERROR, self.script().processing_error);
        Ok(())
    }

    fn set_priority(&mut self, priority: Priority) -> Result<()> {
        self.record(Call::SetPriority(priority));
        self.busy()?;
        if self.script().failing_priority.contains(&self.id) {
            return Err(Errno::INVAL);
        }
        Ok(())
    }

    fn request_performance(&mut self, frames: &[FrameLoad]) -> Result<()> {
        self.record(Call::RequestPerformance(frames.len()));
        Ok(())
    }

    fn open_sibling(&self) -> Result<Box<dyn OneShotDevice>> {
        let devices = MockDevices { shared: self.shared.clone() };
        Ok(devices.one_shot())
    }
}

impl StreamDevice for MockDevice {
    fn set_format(&mut self, direction: Direction, format: &StreamFormat) -> Result<()> {
        self.record(Call::SetFormat(direction, format.format));
        Ok(())
    }

    fn set_crop(&mut self, direction: Direction, crop: Rect) -> Result<()> {
        self.record(Call::SetCrop(direction, crop));
        Ok(())
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<()> {
        self.record(Call::SetControl(control, value));
        Ok(())
    }

    fn request_buffers(&mut self, direction: Direction, count: u32, _: MemoryType) -> Result<()> {
        self.record(Call::RequestBuffers(direction, count));
        if count == 0 && self.script().failing_release == Some(direction) {
            return Err(Errno::IO);
        }
        Ok(())
    }

    fn stream_on(&mut self, direction: Direction) -> Result<()> {
        self.record(Call::StreamOn(direction));
        Ok(())
    }

    fn stream_off(&mut self, direction: Direction) -> Result<()> {
        self.record(Call::StreamOff(direction));
        Ok(())
    }

    fn queue_buffer(&mut self, direction: Direction, buffer: StreamBuffer) -> Result<Option<OwnedFd>> {
        self.record(Call::Queue(direction));
        self.busy()?;
        if self.script().failing_queue == Some(direction) {
            return Err(Errno::INVAL);
        }

        let acquire = buffer.acquire.is_some();
        self.shared.queued.lock().unwrap().push((direction, acquire, buffer.release));
        Ok((acquire || buffer.release).then(dummy_fence))
    }

    fn dequeue_buffer(&mut self, direction: Direction, _: MemoryType) -> Result<bool> {
        self.record(Call::Dequeue(direction));
        Ok(self.script().processing_error)
    }
}
