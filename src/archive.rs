//! Archive reading capability
//!
//! The engine talks to archives through [`ArchiveOpener`] and
//! [`ArchiveHandle`]. [`SevenZipOpener`] is the production implementation on
//! top of `sevenz-rust`; tests substitute in-memory archives.
//!
//! # Blocks
//!
//! 7z packs file data into compressed blocks ("folders"). In a solid archive
//! one block holds many files, and a file can only be decoded after every byte
//! in front of it. [`ArchiveHandle::read_block`] therefore decodes a block once
//! and hands out the requested entries in stream order. Distinct blocks are
//! independent and may be read concurrently; each call opens its own decoder.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sevenz_rust::{BlockDecoder, Password, SevenZArchiveEntry};

use crate::entry::ArchiveEntry;
use crate::error::{Error, Result};

/// An opened archive.
pub trait ArchiveHandle: Send + Sync {
    /// Snapshot of the entry table in archive order.
    fn entries(&self) -> Vec<ArchiveEntry>;

    /// Decode the block shared by `wanted` in a single pass.
    ///
    /// `wanted` holds entries of one block in archive order, or stream-less
    /// entries (`block == None`). Each is passed to `visit` with a reader over
    /// its data; unread data is skipped afterwards. Returning `false` from
    /// `visit` stops the pass.
    fn read_block(
        &self,
        wanted: &[ArchiveEntry],
        visit: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> bool,
    ) -> io::Result<()>;
}

/// Opens archives from the filesystem.
pub trait ArchiveOpener: Send + Sync {
    /// # Errors
    ///
    /// [`Error::ArchiveOpen`] when the file is missing, unreadable, or not a
    /// valid archive.
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveHandle>>;
}

/// Opens unencrypted 7z archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct SevenZipOpener;

impl ArchiveOpener for SevenZipOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveHandle>> {
        Ok(Box::new(SevenZipArchive::open(path)?))
    }
}

/// A 7z archive whose headers have been read.
#[derive(Debug, Clone)]
pub struct SevenZipArchive {
    path: PathBuf,
    header: sevenz_rust::Archive,
}

impl SevenZipArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |reason: String| Error::ArchiveOpen {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(open_error("file not found".to_string()));
        }

        let header = sevenz_rust::Archive::open(path).map_err(|e| open_error(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of compressed blocks.
    pub fn block_count(&self) -> usize {
        self.header.folders.len()
    }
}

impl ArchiveHandle for SevenZipArchive {
    fn entries(&self) -> Vec<ArchiveEntry> {
        self.header
            .files
            .iter()
            .zip(&self.header.stream_map.file_folder_index)
            .map(|(file, block)| ArchiveEntry {
                key: file.name().to_string(),
                is_directory: file.is_directory(),
                size: file.size(),
                block: *block,
            })
            .collect()
    }

    fn read_block(
        &self,
        wanted: &[ArchiveEntry],
        visit: &mut dyn FnMut(&ArchiveEntry, &mut dyn Read) -> bool,
    ) -> io::Result<()> {
        let Some(block) = wanted.first().and_then(|entry| entry.block) else {
            for entry in wanted {
                if !visit(entry, &mut io::empty()) {
                    break;
                }
            }
            return Ok(());
        };

        let mut source = File::open(&self.path)?;
        let password = Password::empty();
        let decoder = BlockDecoder::new(block, &self.header, password.as_slice(), &mut source);

        let mut pending = wanted.iter().peekable();
        decoder
            .for_each_entries(
                &mut |file: &SevenZArchiveEntry,
                      data: &mut dyn Read|
                      -> std::result::Result<bool, sevenz_rust::Error> {
                    // entries share one stream, so every byte must be consumed in order
                    match pending.next_if(|entry| entry.key == file.name()) {
                        Some(entry) => {
                            let keep_going = visit(entry, data);
                            // the visitor reports its own failures
                            let _ = io::copy(data, &mut io::sink());
                            Ok(keep_going && pending.peek().is_some())
                        },
                        None => {
                            io::copy(data, &mut io::sink())?;
                            Ok(true)
                        },
                    }
                },
            )
            .map_err(|e| io::Error::other(e.to_string()))?;

        match pending.next() {
            None => Ok(()),
            Some(entry) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("entry not found in block {block}: {}", entry.key),
            )),
        }
    }
}
