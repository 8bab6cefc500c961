//! Filesystem side of extraction: directory allocation and entry writes

use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::linux::{fadvise_dontneed, preallocate_file};

/// Buffer size for file I/O (256KB for better throughput)
const BUFFER_SIZE: usize = 256 * 1024;

/// Allocates extraction directories and creates parents for entries.
pub trait DirectoryAllocator: Send + Sync {
    /// Create a fresh, empty directory that outlives this call.
    fn create_temp_directory(&self) -> io::Result<PathBuf>;

    /// Where [`create_temp_directory`](Self::create_temp_directory) allocates.
    fn location(&self) -> PathBuf {
        env::temp_dir()
    }

    /// Create `path` and its ancestors. Must succeed if the directory already
    /// exists, including when another thread created it concurrently.
    fn create_if_not_exists(&self, path: &Path) -> io::Result<()>;
}

/// Allocates directories under the system temp dir via `tempfile`.
///
/// Allocated directories are kept on disk; cleaning them up is the caller's job.
#[derive(Debug, Clone)]
pub struct TempDirAllocator {
    prefix: String,
    parent: Option<PathBuf>,
}

impl Default for TempDirAllocator {
    fn default() -> Self {
        Self {
            prefix: "sevenx-".to_string(),
            parent: None,
        }
    }
}

impl TempDirAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Allocate inside `parent` instead of the system temp dir.
    pub fn in_dir(mut self, parent: impl Into<PathBuf>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

impl DirectoryAllocator for TempDirAllocator {
    fn create_temp_directory(&self) -> io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix);
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir.keep())
    }

    fn location(&self) -> PathBuf {
        self.parent.clone().unwrap_or_else(env::temp_dir)
    }

    fn create_if_not_exists(&self, path: &Path) -> io::Result<()> {
        // create_dir_all tolerates concurrent creation of the same path
        fs::create_dir_all(path)
    }
}

/// Copy `data` into a freshly truncated file at `destination`.
///
/// On failure the destination is removed, so a preallocated but unfilled file
/// never survives.
pub(crate) fn write_file(data: &mut dyn Read, destination: &Path, size_hint: u64) -> io::Result<u64> {
    let outfile = File::create(destination)?;

    match write_stream(data, outfile, size_hint) {
        Ok(bytes_written) => Ok(bytes_written),
        Err(e) => {
            let _ = fs::remove_file(destination);
            Err(e)
        },
    }
}

fn write_stream(data: &mut dyn Read, outfile: File, size_hint: u64) -> io::Result<u64> {
    // Linux optimization: pre-allocate disk space to avoid fragmentation
    preallocate_file(&outfile, size_hint);

    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, outfile);
    let mut buffer = vec![0u8; size_hint.clamp(1, BUFFER_SIZE as u64) as usize];

    let mut bytes_written = 0u64;
    loop {
        let bytes_read = data.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        bytes_written += bytes_read as u64;
    }

    let inner_file = writer.into_inner().map_err(|e| e.into_error())?;

    // Extra bytes from preallocation past the real length are released here
    inner_file.set_len(bytes_written)?;
    fadvise_dontneed(&inner_file, bytes_written);

    Ok(bytes_written)
}
