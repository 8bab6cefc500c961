//! In-process 7z extraction
//!
//! [`SevenZipExtractor`] ties the pieces together for one call:
//!
//! 1. Allocate a fresh temp directory
//! 2. Open the archive and snapshot its entry table
//! 3. Keep the entries matching the request's suffix filter
//! 4. Resolve every destination under the temp directory
//! 5. Extract, sequentially or with bounded parallelism
//! 6. Return the output path chosen by [`OutputLayout`]
//!
//! Temp directory allocation and archive opening race against the
//! cancellation token, as does waiting for a worker slot.
//!
//! # Examples
//!
//! ```no_run
//! use sevenx::{ExtractionRequest, SevenZipExtractor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> sevenx::Result<()> {
//! let extractor = SevenZipExtractor::new();
//! let request = ExtractionRequest::new("bundle.7z").filter(".json");
//! let dir = extractor.extract(&request, &CancellationToken::new()).await?;
//! println!("extracted to {}", dir.display());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveHandle, ArchiveOpener, SevenZipOpener};
use crate::entry::select_entries;
use crate::error::{Error, Result};
use crate::fs::{DirectoryAllocator, TempDirAllocator};
use crate::observer::{ExtractionObserver, LogObserver};
use crate::sanitize::ExtractionRoot;
use crate::scheduler::{self, Concurrency, Workers};
use crate::utils::{MAX_PARALLELISM, degree_of_parallelism};

/// Which path an extraction call returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputLayout {
    /// The temp directory itself.
    #[default]
    TempRoot,
    /// The first subdirectory of the temp directory, by name. For archives
    /// that wrap everything in a single top-level folder.
    FirstSubdirectory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub layout: OutputLayout,
    /// Upper clamp for the number of entries extracted at once.
    pub max_parallelism: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            layout: OutputLayout::default(),
            max_parallelism: MAX_PARALLELISM,
        }
    }
}

impl ExtractorConfig {
    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn max_parallelism(mut self, max: usize) -> Self {
        self.max_parallelism = max;
        self
    }
}

/// What to extract in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub archive_path: PathBuf,
    /// Case-insensitive key suffix; `None` extracts every file.
    pub filter_suffix: Option<String>,
    /// Allow bounded parallel extraction. Defaults to `true`.
    pub concurrent: bool,
}

impl ExtractionRequest {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            filter_suffix: None,
            concurrent: true,
        }
    }

    pub fn filter(mut self, suffix: impl Into<String>) -> Self {
        self.filter_suffix = Some(suffix.into());
        self
    }

    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }
}

/// Filterable, traversal-checked 7z extraction into temp directories.
#[derive(Clone)]
pub struct SevenZipExtractor {
    opener: Arc<dyn ArchiveOpener>,
    directories: Arc<dyn DirectoryAllocator>,
    observer: Arc<dyn ExtractionObserver>,
    config: ExtractorConfig,
}

impl Default for SevenZipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SevenZipExtractor {
    /// 7z reader, system temp dir, `log` output, default config.
    pub fn new() -> Self {
        Self {
            opener: Arc::new(SevenZipOpener),
            directories: Arc::new(TempDirAllocator::new()),
            observer: Arc::new(LogObserver),
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn ArchiveOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn with_directories(mut self, directories: Arc<dyn DirectoryAllocator>) -> Self {
        self.directories = directories;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExtractionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract the request's archive into a new temp directory.
    ///
    /// Entries that fail to write are reported to the observer and skipped;
    /// the call still succeeds. When nothing matches the filter the empty
    /// temp directory is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Directory`] if the temp directory cannot be allocated
    /// - [`Error::ArchiveOpen`] for a missing, unreadable, or malformed archive
    /// - [`Error::PathTraversal`] if any selected entry escapes the temp directory
    /// - [`Error::Cancelled`] once `cancel` fires
    /// - [`Error::NoOutputDirectory`] under [`OutputLayout::FirstSubdirectory`]
    ///   when extraction produced no subdirectory
    pub async fn extract(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let directories = Arc::clone(&self.directories);
        let temp_dir = blocking(cancel, move || {
            directories
                .create_temp_directory()
                .map_err(|source| Error::Directory {
                    path: directories.location(),
                    source,
                })
        })
        .await?;

        self.observer
            .extraction_started(&request.archive_path, &temp_dir);

        let opener = Arc::clone(&self.opener);
        let archive_path = request.archive_path.clone();
        let archive: Arc<dyn ArchiveHandle> =
            blocking(cancel, move || opener.open(&archive_path).map(Arc::from)).await?;

        let filter = request.filter_suffix.as_deref();
        let entries = select_entries(archive.entries(), filter);
        if entries.is_empty() {
            self.observer.no_entries_matched(filter);
            return Ok(temp_dir);
        }
        self.observer.entries_selected(entries.len());

        let root = ExtractionRoot::new(&temp_dir).map_err(|source| Error::Directory {
            path: temp_dir.clone(),
            source,
        })?;

        let concurrency = if request.concurrent {
            Concurrency::Bounded(degree_of_parallelism(self.config.max_parallelism))
        } else {
            Concurrency::Sequential
        };

        let workers = Workers {
            archive,
            directories: Arc::clone(&self.directories),
            observer: Arc::clone(&self.observer),
        };
        let summary = scheduler::run(entries, &root, &workers, concurrency, cancel).await?;

        self.observer
            .extraction_finished(&request.archive_path, &summary);

        match self.config.layout {
            OutputLayout::TempRoot => Ok(temp_dir),
            OutputLayout::FirstSubdirectory => {
                blocking(cancel, move || first_subdirectory(&temp_dir)).await
            },
        }
    }
}

/// Run blocking work on tokio's blocking pool, abandoning it on cancellation.
pub(crate) async fn blocking<T, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let task = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        joined = task => joined.map_err(io::Error::other)?,
    }
}

/// First subdirectory of `dir` in lexicographic order.
fn first_subdirectory(dir: &Path) -> Result<PathBuf> {
    let listing_error = |source| Error::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let mut subdirectories = Vec::new();
    for entry in fs::read_dir(dir).map_err(listing_error)? {
        let entry = entry.map_err(listing_error)?;
        if entry.file_type().map_err(listing_error)?.is_dir() {
            subdirectories.push(entry.path());
        }
    }

    subdirectories.sort();
    subdirectories
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoOutputDirectory(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryArchive, MissingArchive, RecordingObserver};

    struct Fixture {
        parent: tempfile::TempDir,
        observer: Arc<RecordingObserver>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                parent: tempfile::tempdir().unwrap(),
                observer: Arc::new(RecordingObserver::default()),
            }
        }

        fn extractor(&self, opener: Arc<dyn ArchiveOpener>) -> SevenZipExtractor {
            SevenZipExtractor::new()
                .with_opener(opener)
                .with_directories(Arc::new(TempDirAllocator::new().in_dir(self.parent.path())))
                .with_observer(Arc::clone(&self.observer) as Arc<dyn ExtractionObserver>)
        }

        fn allocated_dirs(&self) -> usize {
            fs::read_dir(self.parent.path()).unwrap().count()
        }
    }

    fn sample_archive() -> MemoryArchive {
        MemoryArchive::new()
            .with_directory("dir1/")
            .with_file("dir1/file1.txt", &[1u8; 10])
            .with_file("dir1/file2.log", &[2u8; 5])
            .with_file("dir2/file3.txt", &[3u8; 20])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_filtered_concurrent_extraction() {
        let fixture = Fixture::new();
        let extractor = fixture.extractor(Arc::new(sample_archive()));
        let request = ExtractionRequest::new("sample.7z").filter(".txt");

        let out = extractor
            .extract(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fs::metadata(out.join("dir1/file1.txt")).unwrap().len(), 10);
        assert_eq!(fs::metadata(out.join("dir2/file3.txt")).unwrap().len(), 20);
        assert!(!out.join("dir1/file2.log").exists());

        let summaries = fixture.observer.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].extracted, 2);
        assert_eq!(summaries[0].bytes, 30);
    }

    #[tokio::test]
    async fn test_sequential_extraction_without_filter() {
        let fixture = Fixture::new();
        let extractor = fixture.extractor(Arc::new(sample_archive()));
        let request = ExtractionRequest::new("sample.7z").concurrent(false);

        let out = extractor
            .extract(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert!(out.join("dir1/file2.log").exists());
        assert_eq!(
            fixture.observer.extracted_entries(),
            ["dir1/file1.txt", "dir1/file2.log", "dir2/file3.txt"]
        );
    }

    #[tokio::test]
    async fn test_no_match_returns_empty_dir_with_warning() {
        let fixture = Fixture::new();
        let extractor = fixture.extractor(Arc::new(sample_archive()));
        let request = ExtractionRequest::new("sample.7z").filter(".json");

        let out = extractor
            .extract(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
        assert_eq!(
            fixture.observer.empty_match_warnings(),
            vec![Some(".json".to_string())]
        );
    }

    #[tokio::test]
    async fn test_first_subdirectory_layout() {
        let fixture = Fixture::new();
        let archive = MemoryArchive::new()
            .with_file("zeta/b.txt", b"b")
            .with_file("alpha/a.txt", b"a");
        let extractor = fixture
            .extractor(Arc::new(archive))
            .with_config(ExtractorConfig::default().layout(OutputLayout::FirstSubdirectory));

        let out = extractor
            .extract(&ExtractionRequest::new("wrapped.7z"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.file_name().unwrap(), "alpha");
        assert!(out.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_first_subdirectory_missing() {
        let fixture = Fixture::new();
        let archive = MemoryArchive::new().with_file("flat.txt", b"flat");
        let extractor = fixture
            .extractor(Arc::new(archive))
            .with_config(ExtractorConfig::default().layout(OutputLayout::FirstSubdirectory));

        let result = extractor
            .extract(&ExtractionRequest::new("flat.7z"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::NoOutputDirectory(_))));
    }

    #[tokio::test]
    async fn test_partial_failure_still_returns_path() {
        let fixture = Fixture::new();
        let archive = sample_archive().failing_on("dir1/file1.txt");
        let extractor = fixture.extractor(Arc::new(archive));

        let out = extractor
            .extract(&ExtractionRequest::new("sample.7z"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!out.join("dir1/file1.txt").exists());
        assert!(out.join("dir1/file2.log").exists());
        assert!(out.join("dir2/file3.txt").exists());
        assert_eq!(fixture.observer.failed_entries(), ["dir1/file1.txt"]);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let fixture = Fixture::new();
        let extractor = fixture.extractor(Arc::new(MissingArchive));

        let result = extractor
            .extract(&ExtractionRequest::new("missing.7z"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::ArchiveOpen { .. })));
    }

    #[tokio::test]
    async fn test_traversal_is_fatal() {
        let fixture = Fixture::new();
        let archive = sample_archive().with_file("..\\..\\outside.txt", b"evil");
        let extractor = fixture.extractor(Arc::new(archive));

        let result = extractor
            .extract(&ExtractionRequest::new("evil.7z"), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::PathTraversal { .. })));
        assert!(!fixture.parent.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fixture = Fixture::new();
        let archive = sample_archive();
        let probe = archive.probe();
        let extractor = fixture.extractor(Arc::new(archive));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = extractor
            .extract(&ExtractionRequest::new("sample.7z"), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(probe.write_order().is_empty());
        assert_eq!(fixture.allocated_dirs(), 0);
    }

    #[tokio::test]
    async fn test_allocation_failure_names_configured_parent() {
        let fixture = Fixture::new();
        let missing = fixture.parent.path().join("not-created");
        let extractor = fixture
            .extractor(Arc::new(sample_archive()))
            .with_directories(Arc::new(TempDirAllocator::new().in_dir(&missing)));

        let result = extractor
            .extract(&ExtractionRequest::new("sample.7z"), &CancellationToken::new())
            .await;

        match result {
            Err(Error::Directory { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected directory error, got {other:?}"),
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = ExtractionRequest::new("a.7z");
        assert!(request.concurrent);
        assert_eq!(request.filter_suffix, None);

        let config = ExtractorConfig::default();
        assert_eq!(config.layout, OutputLayout::TempRoot);
        assert_eq!(config.max_parallelism, MAX_PARALLELISM);
    }
}
