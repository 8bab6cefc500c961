//! Error taxonomy for extraction
//!
//! Every failure that aborts an extraction call surfaces as one of these
//! variants. [`Error::EntryExtraction`] is the exception: the scheduler reports
//! it to the observer and moves on to the next entry.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open archive '{}': {reason}", .path.display())]
    ArchiveOpen { path: PathBuf, reason: String },

    #[error(
        "path traversal detected: entry '{entry}' resolves to '{}' outside '{}'",
        .resolved.display(),
        .root.display()
    )]
    PathTraversal {
        entry: String,
        resolved: PathBuf,
        root: PathBuf,
    },

    #[error("invalid archive entry key: {reason}")]
    InvalidEntryKey { reason: &'static str },

    #[error("failed to extract '{entry}': {source}")]
    EntryExtraction { entry: String, source: io::Error },

    #[error("extraction cancelled")]
    Cancelled,

    #[error("7-Zip is not supported on this platform ({os})")]
    PlatformNotSupported { os: &'static str },

    #[error("external extractor '{}' failed: {reason}", .program.display())]
    ExternalTool { program: PathBuf, reason: String },

    #[error("extraction produced no subdirectory in '{}'", .0.display())]
    NoOutputDirectory(PathBuf),

    #[error("directory operation failed: {}: {source}", .path.display())]
    Directory { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error aborts the whole extraction call.
    ///
    /// Only per-entry write failures are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EntryExtraction { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
