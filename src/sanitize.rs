//! Destination path resolution with traversal protection
//!
//! Archive keys are attacker-controlled. [`resolve_destination`] turns a key
//! into an absolute path under an [`ExtractionRoot`] and refuses anything that
//! would land outside it. A refusal is fatal for the whole extraction call: a
//! hostile archive is never partially extracted with the bad entries skipped.

use std::io;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use crate::error::{Error, Result};

/// The directory that bounds every write of one extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRoot {
    path: PathBuf,
    prefix: String,
}

impl ExtractionRoot {
    /// Build the root from a directory path.
    ///
    /// Relative paths are made absolute against the current directory, then
    /// `.` and `..` components are collapsed lexically.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let absolute = std::path::absolute(dir.as_ref())?;
        let path = normalize_path(&absolute);

        let mut prefix = path.to_string_lossy().into_owned();
        if !prefix.ends_with(MAIN_SEPARATOR) {
            prefix.push(MAIN_SEPARATOR);
        }

        Ok(Self { path, prefix })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// String form of the root, always terminated by the platform separator.
    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    fn contains(&self, candidate: &Path) -> bool {
        let candidate = candidate.to_string_lossy();
        candidate
            .as_bytes()
            .get(..self.prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(self.prefix.as_bytes()))
    }
}

/// Resolve an archive key to its destination under `root`.
///
/// # Errors
///
/// - [`Error::InvalidEntryKey`] for an empty key
/// - [`Error::PathTraversal`] when the key is rooted, carries a drive prefix,
///   contains a `..` segment, or otherwise resolves outside `root`
///
/// # Examples
///
/// ```
/// use sevenx::sanitize::{ExtractionRoot, resolve_destination};
///
/// let root = ExtractionRoot::new(std::env::temp_dir().join("sevenx-doc"))?;
/// let dest = resolve_destination(&root, "dir\\file.txt")?;
/// assert!(dest.starts_with(root.as_path()));
/// assert!(resolve_destination(&root, "../escape.txt").is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn resolve_destination(root: &ExtractionRoot, key: &str) -> Result<PathBuf> {
    if key.is_empty() {
        return Err(Error::InvalidEntryKey {
            reason: "entry key is empty",
        });
    }

    let normalized: String = key
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect();
    let relative = Path::new(&normalized);

    let traversal = |resolved: PathBuf| Error::PathTraversal {
        entry: key.to_string(),
        resolved,
        root: root.as_path().to_path_buf(),
    };

    let hostile = has_drive_prefix(&normalized)
        || relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if hostile {
        return Err(traversal(normalize_path(&root.as_path().join(relative))));
    }

    let resolved = normalize_path(&root.as_path().join(relative));
    if !root.contains(&resolved) {
        return Err(traversal(resolved));
    }

    Ok(resolved)
}

/// `C:` style prefixes are hostile on every platform, not only on Windows.
fn has_drive_prefix(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            },
            Component::CurDir => {},
            other => result.push(other.as_os_str()),
        }
    }

    result
}
