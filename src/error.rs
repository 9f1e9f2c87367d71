//! Error types for blocksync operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a synchronization run.
///
/// Every variant is fatal: nothing is retried or downgraded, and the only
/// recovery path is re-running the tool, which is safe because each block's
/// destination write is made durable before its ledger record is updated.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Source file missing or unreadable at startup.
    #[error("file {path} does not exist or could not be read")]
    SourceNotFound {
        /// Path of the source file
        path: PathBuf,
    },

    /// Ledger byte length is off the 33-byte record grid.
    #[error("size of checksum ledger {path} ({len} bytes) is not a multiple of 33, therefore it is broken")]
    CorruptLedger {
        /// Path of the ledger file
        path: PathBuf,
        /// Observed byte length
        len: u64,
    },

    /// A ledger record failed the 32-lowercase-hex-plus-newline shape check.
    #[error("malformed checksum record in {path} at offset {offset}")]
    MalformedRecord {
        /// Path of the ledger file
        path: PathBuf,
        /// Byte offset of the offending record
        offset: u64,
    },

    /// Failed to open or create a file.
    #[error("cannot open {path}: {source}")]
    OpenFailed {
        /// Path being opened
        path: PathBuf,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Read failure with file and offset context.
    #[error("cannot read {path} at offset {offset}: {source}")]
    ReadFailed {
        /// Path being read
        path: PathBuf,
        /// Byte offset of the failed read
        offset: u64,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Seek, write, sync, or truncate failure with file and offset context.
    #[error("cannot write {path} at offset {offset}: {source}")]
    WriteFailed {
        /// Path being written
        path: PathBuf,
        /// Byte offset of the failed write
        offset: u64,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// Uncontextualized I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for blocksync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
