//! Linux-specific write hints for extracted files
//!
//! - `fallocate()` - Pre-allocate disk space to avoid fragmentation
//! - `fadvise(POSIX_FADV_DONTNEED)` - Drop written pages from the cache

use std::fs::File;

/// Pre-allocate disk space for a file to avoid fragmentation
#[cfg(target_os = "linux")]
pub fn preallocate_file(file: &File, size: u64) {
    use rustix::fs::{FallocateFlags, fallocate};

    if size > 0 {
        let _ = fallocate(file, FallocateFlags::empty(), 0, size);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn preallocate_file(_file: &File, _size: u64) {}

/// Advise kernel we're done with file data (can be evicted from cache)
#[cfg(target_os = "linux")]
pub fn fadvise_dontneed(file: &File, len: u64) {
    use rustix::fs::{Advice, fadvise};
    use std::num::NonZeroU64;

    let _ = fadvise(file, 0, NonZeroU64::new(len), Advice::DontNeed);
}

#[cfg(not(target_os = "linux"))]
pub fn fadvise_dontneed(_file: &File, _len: u64) {}
