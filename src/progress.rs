//! Terminal progress for the command-line tool

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::entry::ArchiveEntry;
use crate::error::Error;
use crate::observer::{ExtractionObserver, ExtractionSummary, LogObserver};

/// Drives an indicatif progress bar and forwards everything to [`LogObserver`].
pub struct ProgressObserver {
    bar: ProgressBar,
    log: LogObserver,
    verbose: bool,
}

impl ProgressObserver {
    /// `quiet` follows the CLI: 0 shows the bar and per-file lines, anything
    /// higher leaves only error lines.
    pub fn new(quiet: u8) -> anyhow::Result<Self> {
        let bar = if quiet == 0 {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                    )?
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        Ok(Self {
            bar,
            log: LogObserver,
            verbose: quiet == 0,
        })
    }

    fn say(&self, message: String) {
        if self.bar.is_hidden() {
            eprintln!("{message}");
        } else {
            self.bar.println(message);
        }
    }
}

impl ExtractionObserver for ProgressObserver {
    fn extraction_started(&self, archive: &Path, destination: &Path) {
        self.log.extraction_started(archive, destination);
    }

    fn entries_selected(&self, count: usize) {
        self.bar.set_length(count as u64);
        self.log.entries_selected(count);
    }

    fn no_entries_matched(&self, filter: Option<&str>) {
        self.log.no_entries_matched(filter);
    }

    fn entry_started(&self, entry: &ArchiveEntry) {
        self.log.entry_started(entry);
    }

    fn entry_extracted(&self, entry: &ArchiveEntry, bytes: u64) {
        if self.verbose {
            self.say(format!("  extracting: {}", entry.key));
        }
        self.bar.inc(1);
        self.log.entry_extracted(entry, bytes);
    }

    fn entry_failed(&self, entry: &ArchiveEntry, error: &Error) {
        self.say(format!("    error: {error}"));
        self.bar.inc(1);
        self.log.entry_failed(entry, error);
    }

    fn extraction_finished(&self, archive: &Path, summary: &ExtractionSummary) {
        self.bar.finish_and_clear();
        self.log.extraction_finished(archive, summary);
    }

    fn external_tool_started(&self, program: &Path, args: &[std::ffi::OsString]) {
        self.bar.set_style(ProgressStyle::default_spinner());
        self.bar.enable_steady_tick(std::time::Duration::from_millis(120));
        self.log.external_tool_started(program, args);
    }

    fn external_tool_finished(&self, program: &Path) {
        self.bar.finish_and_clear();
        self.log.external_tool_finished(program);
    }
}
