//! linux dma-heap allocation
use rustix::{
    fd::{AsFd, FromRawFd, OwnedFd},
    ioctl::{self, opcode, Opcode, Updater},
};

pub const FD_CLOEXEC: u32 = 0o2_000_000;
pub const FD_RDWR: u32 = 0o2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationData {
    pub len: u64,
    pub fd: u32,
    pub fd_flags: u32,
    pub heap_flags: u64,
}

const ALLOC: Opcode = opcode::read_write::<AllocationData>(b'H', 0);

/// allocate `len` bytes from the heap opened as `heap`, returning a dmabuf
pub fn allocate(heap: impl AsFd, len: u64) -> rustix::io::Result<OwnedFd> {
    let mut data = AllocationData {
        len,
        fd: 0,
        fd_flags: FD_CLOEXEC | FD_RDWR,
        heap_flags: 0,
    };
    // SAFETY: `AllocationData` matches `struct dma_heap_allocation_data`
    unsafe { ioctl::ioctl(heap, Updater::<ALLOC, AllocationData>::new(&mut data))? };
    // SAFETY: on success the kernel installed a new descriptor that we now own
    Ok(unsafe { OwnedFd::from_raw_fd(data.fd as i32) })
}
