//! which images of a job produce release fences, and where those fences go
use std::os::fd::OwnedFd;

/// decide the release fences for one job
///
/// `acquire[i]` tells whether image `i` carries an acquire fence, images are
/// in submission order with the target first. images carrying an acquire fence
/// release first, then release is forced on the rest in order until `slots`
/// fences are produced or no image is left
pub(crate) fn negotiate(acquire: &[bool], slots: usize) -> Vec<bool> {
    let mut release = vec![false; acquire.len()];
    let mut count = 0;

    for (release, _) in release.iter_mut().zip(acquire).filter(|(_, acquire)| **acquire) {
        if count == slots {
            break;
        }
        *release = true;
        count += 1;
    }

    for release in release.iter_mut().filter(|release| !**release) {
        if count == slots {
            break;
        }
        *release = true;
        count += 1;
    }

    release
}

/// write produced fences into `slots` in order, every slot left over gets `None`
///
/// fences beyond the number of slots are closed
pub(crate) fn fill_slots(slots: &mut [Option<OwnedFd>], produced: impl IntoIterator<Item = OwnedFd>) {
    let mut produced = produced.into_iter();
    for slot in slots.iter_mut() {
        *slot = produced.next();
    }
    let extra = produced.count();
    if extra > 0 {
        tracing::debug!("closing {extra} release fences nobody asked for");
    }
}

pub(crate) fn clear_slots(slots: &mut [Option<OwnedFd>]) {
    slots.iter_mut().for_each(|slot| *slot = None);
}

#[cfg(test)]
pub(crate) fn dummy_fence() -> OwnedFd {
    std::fs::File::open("/dev/null").expect("/dev/null").into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_fenced_images_release_first() {
        // target, source 0, source 1, source 2
        let acquire = [false, true, false, true];
        assert_eq!(negotiate(&acquire, 2), [false, true, false, true]);
        assert_eq!(negotiate(&acquire, 1), [false, true, false, false]);
    }

    #[test]
    fn extra_slots_force_target_then_sources() {
        let acquire = [false, false, true, false];
        assert_eq!(negotiate(&acquire, 2), [true, false, true, false]);
        assert_eq!(negotiate(&acquire, 3), [true, true, true, false]);
    }

    #[test]
    fn slots_beyond_images_are_exhausted() {
        assert_eq!(negotiate(&[true, false], 5), [true, true]);
        assert_eq!(negotiate(&[true, true], 0), [false, false]);
    }

    #[test]
    fn unfilled_slots_are_none() {
        let mut slots: Vec<Option<OwnedFd>> = (0..4).map(|_| Some(dummy_fence())).collect();
        fill_slots(&mut slots, [dummy_fence()]);
        assert!(slots[0].is_some());
        assert!(slots[1..].iter().all(Option::is_none));
    }

    #[test]
    fn surplus_fences_are_dropped() {
        let mut slots = [None];
        fill_slots(&mut slots, [dummy_fence(), dummy_fence()]);
        assert!(slots[0].is_some());
    }
}
