//! Safe, bounded-parallel 7-Zip extraction into temporary directories

pub mod archive;
pub mod args;
pub mod entry;
pub mod error;
pub mod external;
pub mod extract;
pub mod fs;
pub mod linux;
pub mod list;
pub mod observer;
pub mod progress;
pub mod sanitize;
mod scheduler;
pub mod utils;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveHandle, ArchiveOpener, SevenZipArchive, SevenZipOpener};
pub use args::Args;
pub use entry::{ArchiveEntry, select_entries};
pub use error::{Error, Result};
pub use external::{ExternalExtractor, Platform, ProcessRunner, TokioProcessRunner};
pub use extract::{ExtractionRequest, ExtractorConfig, OutputLayout, SevenZipExtractor};
pub use fs::{DirectoryAllocator, TempDirAllocator};
pub use list::{list_contents, list_entries};
pub use observer::{ExtractionObserver, ExtractionSummary, LogObserver, NullObserver};
pub use progress::ProgressObserver;
pub use sanitize::{ExtractionRoot, resolve_destination};
pub use scheduler::Concurrency;
pub use utils::{degree_of_parallelism, format_size};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
