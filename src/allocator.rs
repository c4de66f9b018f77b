//! memory for intermediate prescale buffers
use rustix::fs::{Mode, OFlags};
use std::{fmt, io, os::fd::OwnedFd, path::PathBuf};

pub trait BufferAllocator: fmt::Debug + Send + Sync {
    /// a dmabuf of at least `len` bytes
    fn allocate(&self, len: u32, protected: bool) -> io::Result<OwnedFd>;
}

/// allocates from linux dma-heaps
#[derive(Debug, Clone)]
pub struct DmaHeapAllocator {
    system: PathBuf,
    secure: PathBuf,
}

impl DmaHeapAllocator {
    pub fn new(system: impl Into<PathBuf>, secure: impl Into<PathBuf>) -> Self {
        Self { system: system.into(), secure: secure.into() }
    }
}

impl BufferAllocator for DmaHeapAllocator {
    fn allocate(&self, len: u32, protected: bool) -> io::Result<OwnedFd> {
        let path = if protected { &self.secure } else { &self.system };
        let heap = rustix::fs::open(path, OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())?;
        let buffer = blit_uapi::dma_heap::allocate(&heap, len as u64)?;
        tracing::debug!("allocated {len} bytes from {}", path.display());
        Ok(buffer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };

    /// hands out `/dev/null` descriptors and counts allocations
    #[derive(Debug, Default, Clone)]
    pub(crate) struct CountingAllocator {
        pub allocations: Arc<AtomicUsize>,
        exhausted: Arc<AtomicBool>,
    }

    impl CountingAllocator {
        pub fn count(&self) -> usize {
            self.allocations.load(Ordering::SeqCst)
        }

        /// fail every allocation with `ENOMEM` until called with `false`
        pub fn set_exhausted(&self, exhausted: bool) {
            self.exhausted.store(exhausted, Ordering::SeqCst);
        }
    }

    impl BufferAllocator for CountingAllocator {
        fn allocate(&self, _: u32, _: bool) -> io::Result<OwnedFd> {
            if self.exhausted.load(Ordering::SeqCst) {
                return Err(rustix::io::Errno::NOMEM.into());
            }
            self.allocations.fetch_add(1, Ordering::SeqCst);
            Ok(std::fs::File::open("/dev/null")?.into())
        }
    }

    #[test]
    fn missing_heap_is_an_error() {
        let allocator = DmaHeapAllocator::new("/nonexistent/system", "/nonexistent/secure");
        assert!(allocator.allocate(4096, false).is_err());
        assert!(allocator.allocate(4096, true).is_err());
    }
}
