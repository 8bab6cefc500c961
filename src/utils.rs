//! Utility functions for formatting and sizing worker pools
//!
//! # Examples
//!
//! ```
//! use sevenx::{degree_of_parallelism, format_size};
//!
//! assert_eq!(format_size(1024), "1.0K");
//! assert_eq!(format_size(1536 * 1024), "1.5M");
//!
//! let dop = degree_of_parallelism(8);
//! assert!((1..=8).contains(&dop));
//! ```

use std::num::NonZeroUsize;
use std::thread;

/// Default upper bound on concurrently extracted entries.
pub const MAX_PARALLELISM: usize = 8;

/// Format a byte size as a human-readable string with appropriate units.
///
/// Converts raw byte counts to KB, MB, or GB units with one decimal place
/// of precision for better readability in file listings.
///
/// # Examples
///
/// ```
/// use sevenx::format_size;
///
/// assert_eq!(format_size(512), "512B");
/// assert_eq!(format_size(1024), "1.0K");
/// assert_eq!(format_size(1536 * 1024), "1.5M");
/// assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.0G");
/// ```
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.1}G", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1}M", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1}K", size as f64 / KB as f64)
    } else {
        format!("{}B", size)
    }
}

/// Number of entries that may be extracted at once.
///
/// `clamp(available_parallelism, 1, cap)`; a `cap` of zero is treated as one.
pub fn degree_of_parallelism(cap: usize) -> usize {
    let available = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    clamp_parallelism(available, cap)
}

fn clamp_parallelism(available: usize, cap: usize) -> usize {
    available.clamp(1, cap.max(1))
}
