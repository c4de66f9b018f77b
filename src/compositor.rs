//! the contract every engine backend fulfills
use std::{num::NonZeroU32, os::fd::OwnedFd};

use crate::{
    canvas::Canvas,
    capability::Capability,
    error::{Error, Result},
    layer::{Layer, LayerId},
    perf::PerformanceRequest,
    scene::{Color, Scene},
};

/// hardware scheduling priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    #[default]
    Default,
    Low,
    Medium,
    High,
    Highest,
}

impl TryFrom<i32> for Priority {
    type Error = Error;

    /// `-1` is the driver default, anything above 2 up to 15 is the highest
    fn try_from(value: i32) -> Result<Self> {
        match value {
            -1 => Ok(Priority::Default),
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            3..=15 => Ok(Priority::Highest),
            _ => Err(Error::InvalidPriority(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prioritized {
    /// in effect for every job from now on
    Applied,
    /// a job already queued may still run at the previous priority
    Pending,
}

/// identifies a submission to wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecHandle(NonZeroU32);

/// IDLE -> SUBMITTED -> IDLE bookkeeping of blocking-capable submissions
#[derive(Debug, Default)]
pub(crate) struct Submission {
    issued: u32,
    pending: Option<ExecHandle>,
}

impl Submission {
    pub fn issue(&mut self) -> ExecHandle {
        self.issued = self.issued.wrapping_add(1).max(1);
        let handle = ExecHandle(NonZeroU32::new(self.issued).unwrap_or(NonZeroU32::MIN));
        self.pending = Some(handle);
        handle
    }

    pub fn pending(&self) -> Option<ExecHandle> {
        self.pending
    }

    /// # Panics
    ///
    /// `handle` is not the one returned by the last submission
    pub fn complete(&mut self, handle: ExecHandle) {
        let pending = self.pending.take();
        assert_eq!(pending, Some(handle), "waiting on {handle:?} which is not the pending submission");
    }
}

pub trait Compositor {
    fn scene(&self) -> &Scene;

    fn scene_mut(&mut self) -> &mut Scene;

    /// validate, build and submit the job without waiting for the hardware
    ///
    /// every slot of `release_fences` is overwritten, either with a release
    /// fence or with `None`. on any failure after validation the acquire
    /// fences of the canvas and every layer are dropped
    fn execute(&mut self, release_fences: &mut [Option<OwnedFd>]) -> Result<()>;

    /// like [`Compositor::execute`] but returns a handle for [`Compositor::wait_execution`]
    fn submit(&mut self) -> Result<ExecHandle>;

    /// execute and block until the hardware finished
    fn execute_blocking(&mut self) -> Result<()>;

    /// # Panics
    ///
    /// `handle` is not the value returned by the last [`Compositor::submit`]
    fn wait_execution(&mut self, handle: ExecHandle) -> Result<()>;

    /// block until everything this engine submitted has completed
    fn wait_idle(&mut self) -> Result<()>;

    fn prioritize(&mut self, priority: Priority) -> Result<Prioritized> {
        self.scene_mut().set_priority(priority);
        Ok(Prioritized::Applied)
    }

    /// `None` or an empty request cancels any standing request
    fn request_performance_qos(&mut self, request: Option<&PerformanceRequest>) -> Result<()>;

    fn capability(&self) -> &'static Capability {
        self.scene().capability()
    }

    fn priority(&self) -> Priority {
        self.scene().priority()
    }

    fn canvas_mut(&mut self) -> &mut Canvas {
        self.scene_mut().canvas_mut()
    }

    fn create_layer(&mut self) -> Result<LayerId> {
        self.scene_mut().create_layer()
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.scene_mut().layer_mut(id).ok_or(Error::LayerNotFound(id))
    }

    fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        self.scene_mut().remove_layer(id)
    }

    fn set_background_color(&mut self, color: Option<Color>) {
        self.scene_mut().set_background_color(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_levels() {
        assert_eq!(Priority::try_from(-1).unwrap(), Priority::Default);
        assert_eq!(Priority::try_from(2).unwrap(), Priority::High);
        assert_eq!(Priority::try_from(9).unwrap(), Priority::Highest);
        assert!(matches!(Priority::try_from(-2), Err(Error::InvalidPriority(-2))));
        assert!(Priority::try_from(16).is_err());
    }

    #[test]
    fn handles_are_never_reused_back_to_back() {
        let mut submission = Submission::default();
        let first = submission.issue();
        submission.complete(first);
        let second = submission.issue();
        assert_ne!(first, second);
        assert_eq!(submission.pending(), Some(second));
    }

    #[test]
    #[should_panic]
    fn mismatched_handle_is_fatal() {
        let mut submission = Submission::default();
        let first = submission.issue();
        let _second = submission.issue();
        submission.complete(first);
    }
}
