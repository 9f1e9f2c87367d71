//! # blocksync
//!
//! Incremental, block-granular synchronization of one large file onto slower
//! storage, avoiding a full re-copy when only parts of the source changed.
//!
//! The source is read sequentially in fixed-size blocks. Each block's MD4
//! digest is compared against a persisted per-block checksum ledger from the
//! previous run: matching blocks are skipped, changed blocks are rewritten in
//! place, and new blocks are appended. In sparse mode, all-zero blocks at
//! never-synced positions are skipped entirely, leaving sparse holes.
//!
//! ## Features
//!
//! - **Block-level diffing**: only changed blocks touch the destination
//! - **Persistent ledger**: 33-byte digest records keyed by block position
//! - **Sparse destinations**: optional hole-punching for all-zero regions
//! - **Crash-safe resumption**: each block write is durable before its
//!   ledger record is updated, so an interrupted run can simply be re-run
//!
//! ## Example
//!
//! ```rust
//! use blocksync::SyncBuilder;
//!
//! let dir = tempfile::tempdir()?;
//! let source = dir.path().join("documents.dmg");
//! let dest = dir.path().join("documents.dmg.backup");
//! let ledger = dir.path().join("documents.dmg.backup.blocksync");
//! std::fs::write(&source, vec![42u8; 10_000])?;
//!
//! // First run copies everything and seeds the ledger.
//! let sync = SyncBuilder::new().block_size(4096).build();
//! let stats = sync.sync(&source, &dest, &ledger)?;
//! assert_eq!(stats.bytes_written, 10_000);
//!
//! // An unchanged source costs no destination writes at all.
//! let stats = sync.sync(&source, &dest, &ledger)?;
//! assert_eq!(stats.bytes_written, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

mod block;
mod dest;
mod digest;
mod engine;
mod error;
mod human;
mod ledger;
mod reconcile;

pub use block::BlockReader;
pub use dest::Destination;
pub use digest::{BlockDigest, DIGEST_HEX_LEN};
pub use engine::{
    BlockEvent, BlockStatus, BlockSync, SyncBuilder, SyncOptions, SyncStats, DEFAULT_BLOCK_SIZE,
};
pub use error::{Result, SyncError};
pub use human::{human_duration, human_size};
pub use ledger::{Ledger, RECORD_LEN};
pub use reconcile::SizeReconciler;
