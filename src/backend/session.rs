//! per direction bookkeeping of a streaming mem2mem session
use blit_uapi::v4l2;

use crate::{
    canvas::MemoryType,
    geometry::{Rect, Transform},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// read by the device, the output queue in v4l2 terms
    Source,
    /// written by the device, the capture queue
    Target,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Source, Direction::Target];

    pub const fn buf_type(self) -> u32 {
        match self {
            Direction::Source => v4l2::BUF_TYPE_VIDEO_OUTPUT_MPLANE,
            Direction::Target => v4l2::BUF_TYPE_VIDEO_CAPTURE_MPLANE,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Source => "source",
            Direction::Target => "target",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindState {
    /// no buffers requested, format may change
    #[default]
    Unbound,
    /// format set, one buffer requested and streaming
    Bound,
    /// a buffer is queued and not dequeued yet
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    RequestBuffers,
    Queue,
    Dequeue,
    /// stream off and zero buffers
    Reset,
}

impl BindState {
    /// `None` for a transition the protocol does not allow
    pub const fn next(self, transition: Transition) -> Option<BindState> {
        use BindState::*;
        match (self, transition) {
            (Unbound, Transition::RequestBuffers) => Some(Bound),
            (Bound, Transition::Queue) => Some(Queued),
            (Queued, Transition::Dequeue) => Some(Bound),
            (Bound | Queued, Transition::Reset) => Some(Unbound),
            _ => None,
        }
    }

    pub const fn is_bound(self) -> bool {
        !matches!(self, BindState::Unbound)
    }
}

/// everything the device remembers between frames
#[derive(Debug, Default)]
pub struct Session {
    states: [BindState; 2],
    memory: [Option<MemoryType>; 2],
    crops: [Rect; 2],
    transform: Transform,
    transform_changed: bool,
    protected: bool,
}

impl Session {
    pub fn state(&self, direction: Direction) -> BindState {
        self.states[direction.index()]
    }

    /// # Panics
    ///
    /// `transition` is illegal in the current state of `direction`
    pub fn advance(&mut self, direction: Direction, transition: Transition) {
        let state = &mut self.states[direction.index()];
        match state.next(transition) {
            Some(next) => {
                tracing::trace!("{direction}: {state:?} -> {next:?}");
                *state = next;
            }
            None => panic!("{direction}: {transition:?} is illegal in {state:?}"),
        }
    }

    /// memory type of the buffers requested for `direction`
    pub fn memory(&self, direction: Direction) -> Option<MemoryType> {
        self.memory[direction.index()]
    }

    pub fn set_memory(&mut self, direction: Direction, memory: Option<MemoryType>) {
        self.memory[direction.index()] = memory;
    }

    /// crop the device was last configured with
    pub fn crop(&self, direction: Direction) -> Rect {
        self.crops[direction.index()]
    }

    pub fn set_crop(&mut self, direction: Direction, crop: Rect) {
        self.crops[direction.index()] = crop;
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// remember `transform`, a change forces the next frame to rebind
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform_changed |= self.transform != transform;
        self.transform = transform;
    }

    /// whether the transform changed since the last call
    pub fn take_transform_changed(&mut self) -> bool {
        std::mem::take(&mut self.transform_changed)
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn set_protected(&mut self, protected: bool) {
        self.protected = protected;
    }

    /// whether both directions agree on having a buffer in flight
    pub fn queued(&self) -> Option<bool> {
        let [source, target] = self.states.map(|state| state == BindState::Queued);
        (source == target).then_some(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut session = Session::default();
        let dir = Direction::Target;
        session.advance(dir, Transition::RequestBuffers);
        session.advance(dir, Transition::Queue);
        assert_eq!(session.state(dir), BindState::Queued);
        session.advance(dir, Transition::Dequeue);
        session.advance(dir, Transition::Queue);
        session.advance(dir, Transition::Reset);
        assert_eq!(session.state(dir), BindState::Unbound);
        assert_eq!(session.state(Direction::Source), BindState::Unbound);
    }

    #[test]
    fn illegal_transitions() {
        assert_eq!(BindState::Unbound.next(Transition::Queue), None);
        assert_eq!(BindState::Unbound.next(Transition::Reset), None);
        assert_eq!(BindState::Bound.next(Transition::RequestBuffers), None);
        assert_eq!(BindState::Bound.next(Transition::Dequeue), None);
        assert_eq!(BindState::Queued.next(Transition::Queue), None);
    }

    #[test]
    #[should_panic]
    fn queue_before_binding_is_fatal() {
        Session::default().advance(Direction::Source, Transition::Queue);
    }

    #[test]
    fn transform_change_is_reported_once() {
        let mut session = Session::default();
        session.set_transform(Transform::empty());
        assert!(!session.take_transform_changed());
        session.set_transform(Transform::FLIP_H);
        assert!(session.take_transform_changed());
        assert!(!session.take_transform_changed());
    }

    #[test]
    fn directions_out_of_step() {
        let mut session = Session::default();
        assert_eq!(session.queued(), Some(false));
        session.advance(Direction::Source, Transition::RequestBuffers);
        session.advance(Direction::Source, Transition::Queue);
        assert_eq!(session.queued(), None);
    }
}
