//! Extraction event hooks
//!
//! The engine never logs directly. It reports what happens to an
//! [`ExtractionObserver`]; [`LogObserver`] forwards those events to the `log`
//! facade and is the default.

use std::ffi::OsString;
use std::path::Path;

use crate::entry::ArchiveEntry;
use crate::error::Error;
use crate::utils::format_size;

/// Counters for one extraction call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub selected: usize,
    pub extracted: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Receives progress and diagnostics from an extraction call.
///
/// Methods may be called from several worker threads at once.
pub trait ExtractionObserver: Send + Sync {
    fn extraction_started(&self, _archive: &Path, _destination: &Path) {}

    fn entries_selected(&self, _count: usize) {}

    /// The filter matched nothing; the call still succeeds.
    fn no_entries_matched(&self, _filter: Option<&str>) {}

    fn entry_started(&self, _entry: &ArchiveEntry) {}

    fn entry_extracted(&self, _entry: &ArchiveEntry, _bytes: u64) {}

    /// A single entry failed and was skipped.
    fn entry_failed(&self, _entry: &ArchiveEntry, _error: &Error) {}

    fn extraction_finished(&self, _archive: &Path, _summary: &ExtractionSummary) {}

    fn external_tool_started(&self, _program: &Path, _args: &[OsString]) {}

    fn external_tool_finished(&self, _program: &Path) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ExtractionObserver for NullObserver {}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ExtractionObserver for LogObserver {
    fn extraction_started(&self, archive: &Path, destination: &Path) {
        log::info!(
            "Extracting file ({}) to temp dir ({})...",
            archive.display(),
            destination.display()
        );
    }

    fn entries_selected(&self, count: usize) {
        log::debug!("{count} entries selected for extraction");
    }

    fn no_entries_matched(&self, filter: Option<&str>) {
        log::warn!(
            "No entries matched the specified filter '{}'",
            filter.unwrap_or("<none>")
        );
    }

    fn entry_started(&self, entry: &ArchiveEntry) {
        log::debug!("Extracting {} ({})...", entry.key, format_size(entry.size));
    }

    fn entry_failed(&self, entry: &ArchiveEntry, error: &Error) {
        log::error!("Exception extracting entry {}: {error}", entry.key);
    }

    fn extraction_finished(&self, archive: &Path, summary: &ExtractionSummary) {
        log::info!(
            "Finished extracting {}: {} files ({}), {} failed",
            archive.display(),
            summary.extracted,
            format_size(summary.bytes),
            summary.failed
        );
    }

    fn external_tool_started(&self, program: &Path, args: &[OsString]) {
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
        log::info!("Running 7-Zip extraction: {} {}", program.display(), args.join(" "));
    }

    fn external_tool_finished(&self, program: &Path) {
        log::info!("7-Zip extraction complete ({})", program.display());
    }
}
