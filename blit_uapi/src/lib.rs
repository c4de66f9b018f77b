//! kernel interfaces of the exynos 2d engines
//!
//! only structure layout and ioctl plumbing lives here, everything is plain data
//! so the `lacquer` crate can build jobs without touching raw pointers
pub mod dma_heap;
pub mod m2m1shot2;
pub mod v4l2;

pub use rustix::io::{Errno, Result};
