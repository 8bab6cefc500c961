//! Archive entry snapshots and suffix filtering
//!
//! Archive readers expose entries through stateful iteration. Extraction never
//! works on that live view: entries are copied into plain [`ArchiveEntry`]
//! records and filtered into an ordered `Vec` before the first byte is written.
//!
//! # Examples
//!
//! ```
//! use sevenx::{ArchiveEntry, select_entries};
//!
//! let entries = vec![
//!     ArchiveEntry::file("a.txt", 1),
//!     ArchiveEntry::file("b.log", 2),
//!     ArchiveEntry::file("c.TXT", 3),
//!     ArchiveEntry::directory("docs/"),
//! ];
//!
//! let selected = select_entries(entries, Some(".txt"));
//! let keys: Vec<_> = selected.iter().map(|e| e.key.as_str()).collect();
//! assert_eq!(keys, ["a.txt", "c.TXT"]);
//! ```

/// A single record from an archive's entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path; separators may be `/` or `\`.
    pub key: String,
    pub is_directory: bool,
    /// Uncompressed size in bytes. Informational only.
    pub size: u64,
    /// Compressed block holding the entry's data. Entries of one block decode
    /// from a single stream in archive order; `None` means no data stream.
    pub block: Option<usize>,
}

impl ArchiveEntry {
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            is_directory: false,
            size,
            block: None,
        }
    }

    /// Place the entry in compressed block `block`.
    pub fn in_block(mut self, block: usize) -> Self {
        self.block = Some(block);
        self
    }

    pub fn directory(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_directory: true,
            size: 0,
            block: None,
        }
    }
}

/// Select the entries an extraction call will write.
///
/// Keeps entries that are not directories, have a non-empty key, and whose
/// key ends with `filter` (ASCII case-insensitive) when a filter is given.
/// Enumeration order is preserved.
pub fn select_entries<I>(entries: I, filter: Option<&str>) -> Vec<ArchiveEntry>
where
    I: IntoIterator<Item = ArchiveEntry>,
{
    entries
        .into_iter()
        .filter(|entry| !entry.is_directory && !entry.key.is_empty())
        .filter(|entry| filter.is_none_or(|suffix| ends_with_ignore_case(&entry.key, suffix)))
        .collect()
}

/// Ordinal, ASCII case-insensitive suffix test.
pub(crate) fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    let (text, suffix) = (text.as_bytes(), suffix.as_bytes());
    text.len() >= suffix.len() && text[text.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
