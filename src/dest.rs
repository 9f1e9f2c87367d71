//! Sparse-aware destination writing.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Destination file wrapper applying the per-block write-or-skip decision.
///
/// The destination may be an ordinary file, a pre-existing file, or a block
/// device; it is created empty only when it does not exist yet. Every
/// physical write is followed by a durability sync, so each block's on-disk
/// state is crash-consistent before the corresponding ledger record is
/// updated.
#[derive(Debug)]
pub struct Destination {
    file: File,
    path: PathBuf,
    sparse: bool,
}

impl Destination {
    /// Open the destination read-write, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::OpenFailed`] when the file cannot be opened or
    /// created.
    pub fn open(path: &Path, sparse: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| SyncError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            sparse,
        })
    }

    /// Path this destination was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply one changed or new block at `offset`.
    ///
    /// In sparse mode an all-zero block is written only when the same block
    /// position carried a ledger record before (`had_prior`): the previous
    /// destination content at that offset differs and must be overwritten
    /// explicitly. An all-zero block at a position never synced before is
    /// skipped entirely, leaving a sparse hole. Outside sparse mode every
    /// block is written.
    ///
    /// Returns whether the block was physically written.
    ///
    /// # Errors
    ///
    /// Fails on seek, write, or durability-sync errors.
    pub fn write_block(
        &mut self,
        offset: u64,
        block: &[u8],
        is_zero: bool,
        had_prior: bool,
    ) -> Result<bool> {
        let should_write = if self.sparse && is_zero {
            had_prior
        } else {
            true
        };
        if !should_write {
            tracing::trace!(offset, len = block.len(), "leaving sparse hole");
            return Ok(false);
        }

        self.seek(offset)?;
        self.file
            .write_all(block)
            .and_then(|()| self.file.sync_all())
            .map_err(|source| SyncError::WriteFailed {
                path: self.path.clone(),
                offset,
                source,
            })?;
        Ok(true)
    }

    /// Write the single sentinel byte at `offset`, the final logical length.
    ///
    /// Forces the underlying storage to report that length when trailing
    /// sparse skips never extended the file.
    ///
    /// # Errors
    ///
    /// Fails on seek or write errors.
    pub fn write_sentinel(&mut self, offset: u64) -> Result<()> {
        self.seek(offset)?;
        self.file
            .write_all(b"Z")
            .map_err(|source| SyncError::WriteFailed {
                path: self.path.clone(),
                offset,
                source,
            })
    }

    /// Truncate the destination to exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Fails when the truncation is rejected by the OS.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .map_err(|source| SyncError::WriteFailed {
                path: self.path.clone(),
                offset: len,
                source,
            })
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| SyncError::WriteFailed {
                path: self.path.clone(),
                offset,
                source,
            })?;
        Ok(())
    }
}
