//! In-memory archive and recording observer for unit tests

use std::collections::HashSet;
use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveHandle, ArchiveOpener};
use crate::entry::ArchiveEntry;
use crate::error::{Error, Result};
use crate::observer::{ExtractionObserver, ExtractionSummary};

/// Shared instrumentation of a [`MemoryArchive`].
#[derive(Clone, Default)]
pub(crate) struct Probe {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    blocks_read: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `read_block` calls.
    pub(crate) fn blocks_read(&self) -> usize {
        self.blocks_read.load(Ordering::SeqCst)
    }

    /// Keys whose data was handed out, in order.
    pub(crate) fn write_order(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryArchive {
    files: Vec<(ArchiveEntry, Vec<u8>)>,
    fail_on: HashSet<String>,
    panic_on: HashSet<String>,
    cancel_on: Option<(String, CancellationToken)>,
    delay: Option<Duration>,
    probe: Probe,
}

impl MemoryArchive {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(mut self, key: &str, data: &[u8]) -> Self {
        self.files
            .push((ArchiveEntry::file(key, data.len() as u64), data.to_vec()));
        self
    }

    pub(crate) fn with_directory(mut self, key: &str) -> Self {
        self.files.push((ArchiveEntry::directory(key), Vec::new()));
        self
    }

    /// Put every file added so far into compressed block `block`.
    pub(crate) fn solid(mut self, block: usize) -> Self {
        for (entry, _) in &mut self.files {
            if !entry.is_directory {
                entry.block = Some(block);
            }
        }
        self
    }

    /// Every block read sleeps this long while counted as in flight.
    pub(crate) fn with_write_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing_on(mut self, key: &str) -> Self {
        self.fail_on.insert(key.to_string());
        self
    }

    pub(crate) fn panicking_on(mut self, key: &str) -> Self {
        self.panic_on.insert(key.to_string());
        self
    }

    /// Cancel `token` once the data of `key` has been handed out and written.
    pub(crate) fn cancelling_on(mut self, key: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((key.to_string(), token));
        self
    }

    pub(crate) fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

/// Reader that fails on first use, like a corrupt entry.
struct CorruptReader;

impl Read for CorruptReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("injected read failure"))
    }
}

impl MemoryArchive {
    fn read_entries(
        &self,
        wanted: &[ArchiveEntry],
        visit: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> bool,
    ) -> io::Result<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        for entry in wanted {
            if self.panic_on.contains(&entry.key) {
                panic!("corrupt entry {}", entry.key);
            }

            let data = self
                .files
                .iter()
                .find(|(candidate, _)| candidate.key == entry.key)
                .map(|(_, data)| data)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, entry.key.clone()))?;

            self.probe.written.lock().unwrap().push(entry.key.clone());
            let keep_going = if self.fail_on.contains(&entry.key) {
                visit(entry, &mut CorruptReader)
            } else {
                visit(entry, &mut data.as_slice())
            };

            if let Some((key, token)) = &self.cancel_on
                && *key == entry.key
            {
                token.cancel();
            }
            if !keep_going {
                break;
            }
        }
        Ok(())
    }
}

impl ArchiveHandle for MemoryArchive {
    fn entries(&self) -> Vec<ArchiveEntry> {
        self.files.iter().map(|(entry, _)| entry.clone()).collect()
    }

    fn read_block(
        &self,
        wanted: &[ArchiveEntry],
        visit: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> bool,
    ) -> io::Result<()> {
        self.probe.blocks_read.fetch_add(1, Ordering::SeqCst);
        let current = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.read_entries(wanted, visit)));

        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.unwrap_or_else(|payload| panic::resume_unwind(payload))
    }
}

impl ArchiveOpener for MemoryArchive {
    fn open(&self, _path: &Path) -> Result<Box<dyn ArchiveHandle>> {
        Ok(Box::new(self.clone()))
    }
}

/// Opener that always fails, as for a missing archive.
pub(crate) struct MissingArchive;

impl ArchiveOpener for MissingArchive {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveHandle>> {
        Err(Error::ArchiveOpen {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    warnings: Mutex<Vec<Option<String>>>,
    failed: Mutex<Vec<String>>,
    extracted: Mutex<Vec<String>>,
    summaries: Mutex<Vec<ExtractionSummary>>,
}

impl RecordingObserver {
    /// Filters reported through `no_entries_matched`.
    pub(crate) fn empty_match_warnings(&self) -> Vec<Option<String>> {
        self.warnings.lock().unwrap().clone()
    }

    pub(crate) fn failed_entries(&self) -> Vec<String> {
        self.failed.lock().unwrap().clone()
    }

    pub(crate) fn extracted_entries(&self) -> Vec<String> {
        let mut keys = self.extracted.lock().unwrap().clone();
        keys.sort();
        keys
    }

    pub(crate) fn summaries(&self) -> Vec<ExtractionSummary> {
        self.summaries.lock().unwrap().clone()
    }
}

impl ExtractionObserver for RecordingObserver {
    fn no_entries_matched(&self, filter: Option<&str>) {
        self.warnings
            .lock()
            .unwrap()
            .push(filter.map(str::to_string));
    }

    fn entry_extracted(&self, entry: &ArchiveEntry, _bytes: u64) {
        self.extracted.lock().unwrap().push(entry.key.clone());
    }

    fn entry_failed(&self, entry: &ArchiveEntry, _error: &Error) {
        self.failed.lock().unwrap().push(entry.key.clone());
    }

    fn extraction_finished(&self, _archive: &Path, summary: &ExtractionSummary) {
        self.summaries.lock().unwrap().push(*summary);
    }
}
