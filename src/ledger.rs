//! The persisted per-block checksum ledger.
//!
//! The ledger is a flat concatenation of fixed 33-byte records: 32 lowercase
//! hexadecimal characters (a 128-bit digest) followed by a single `\n`.
//! Record `i` corresponds to source block `i` at the block size configured
//! for the run; this positional correspondence is the core invariant, so the
//! cursor advances exactly one record per block, in lockstep with the source
//! reader, and never skips or re-reads out of order.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::digest::{BlockDigest, DIGEST_HEX_LEN};
use crate::error::{Result, SyncError};

/// On-disk width of one checksum record: 32 hex characters plus `\n`.
pub const RECORD_LEN: usize = DIGEST_HEX_LEN + 1;

/// File-backed sequence of per-block digest records.
#[derive(Debug)]
pub struct Ledger {
    file: File,
    path: PathBuf,
    /// Records consumed so far, by reading or appending.
    cursor: u64,
}

impl Ledger {
    /// Check the startup precondition without opening or creating anything.
    ///
    /// A ledger whose byte length is not a multiple of 33 is corrupt, and the
    /// run must fail before the source or destination is touched. A missing
    /// ledger is fine; it will be created empty by [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CorruptLedger`] on a size violation.
    pub fn validate(path: &Path) -> Result<()> {
        if let Ok(meta) = std::fs::metadata(path) {
            let len = meta.len();
            if len % RECORD_LEN as u64 != 0 {
                return Err(SyncError::CorruptLedger {
                    path: path.to_path_buf(),
                    len,
                });
            }
        }
        Ok(())
    }

    /// Open the ledger read-write, creating it empty when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CorruptLedger`] when the existing file violates
    /// the record grid, or [`SyncError::OpenFailed`] when it cannot be
    /// opened or created.
    pub fn open(path: &Path) -> Result<Self> {
        Self::validate(path)?;
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
            cursor: 0,
        })
    }

    /// Number of records consumed so far.
    #[must_use]
    pub const fn records_consumed(&self) -> u64 {
        self.cursor
    }

    /// Read the next stored digest, or `None` when the ledger is exhausted
    /// (meaning the corresponding block is new).
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on records that do not parse as 32 lowercase
    /// hex characters plus `\n`.
    pub fn read_next(&mut self) -> Result<Option<BlockDigest>> {
        let offset = self.cursor * RECORD_LEN as u64;
        self.seek(offset)?;

        let mut record = [0u8; RECORD_LEN];
        let mut filled = 0;
        while filled < RECORD_LEN {
            match self.file.read(&mut record[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(SyncError::ReadFailed {
                        path: self.path.clone(),
                        offset,
                        source,
                    })
                }
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        // The size precondition keeps the file on the 33-byte grid, so a
        // partial record here means the file changed under us.
        if filled < RECORD_LEN || record[DIGEST_HEX_LEN] != b'\n' {
            return Err(self.malformed(offset));
        }
        let digest =
            BlockDigest::from_hex(&record[..DIGEST_HEX_LEN]).ok_or_else(|| self.malformed(offset))?;

        self.cursor += 1;
        Ok(Some(digest))
    }

    /// Overwrite the record just read, in place, at its original offset.
    ///
    /// Must only be called directly after a successful [`read_next`](Self::read_next).
    ///
    /// # Errors
    ///
    /// Fails on seek or write errors.
    pub fn replace_last(&mut self, digest: &BlockDigest) -> Result<()> {
        debug_assert!(self.cursor > 0, "replace_last before any read");
        self.write_record_at(self.cursor - 1, digest)
    }

    /// Write a new record at the current end of the ledger.
    ///
    /// # Errors
    ///
    /// Fails on seek or write errors.
    pub fn append(&mut self, digest: &BlockDigest) -> Result<()> {
        self.write_record_at(self.cursor, digest)?;
        self.cursor += 1;
        Ok(())
    }

    /// Truncate the ledger to exactly `block_count` records, discarding stale
    /// trailing records left over from a longer previous source.
    ///
    /// # Errors
    ///
    /// Fails when the truncation is rejected by the OS.
    pub fn finalize(&mut self, block_count: u64) -> Result<()> {
        let len = block_count * RECORD_LEN as u64;
        tracing::debug!(path = %self.path.display(), len, "truncating ledger");
        self.file
            .set_len(len)
            .map_err(|source| SyncError::WriteFailed {
                path: self.path.clone(),
                offset: len,
                source,
            })
    }

    fn write_record_at(&mut self, index: u64, digest: &BlockDigest) -> Result<()> {
        let offset = index * RECORD_LEN as u64;
        let mut record = [0u8; RECORD_LEN];
        record[..DIGEST_HEX_LEN].copy_from_slice(&digest.hex());
        record[DIGEST_HEX_LEN] = b'\n';

        self.seek(offset)?;
        self.file
            .write_all(&record)
            .map_err(|source| SyncError::WriteFailed {
                path: self.path.clone(),
                offset,
                source,
            })
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| SyncError::ReadFailed {
                path: self.path.clone(),
                offset,
                source,
            })?;
        Ok(())
    }

    fn malformed(&self, offset: u64) -> SyncError {
        SyncError::MalformedRecord {
            path: self.path.clone(),
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(data: &[u8]) -> BlockDigest {
        BlockDigest::compute(data)
    }

    #[test]
    fn open_creates_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.blocksync");

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.records_consumed(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn read_next_on_empty_ledger_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(&dir.path().join("l")).unwrap();
        assert!(ledger.read_next().unwrap().is_none());
        assert_eq!(ledger.records_consumed(), 0);
    }

    #[test]
    fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&digest(b"one")).unwrap();
        ledger.append(&digest(b"two")).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 66);

        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"one")));
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"two")));
        assert_eq!(ledger.read_next().unwrap(), None);
        assert_eq!(ledger.records_consumed(), 2);
    }

    #[test]
    fn records_are_33_bytes_hex_plus_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&digest(b"")).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), 33);
        assert_eq!(&raw[..32], b"31d6cfe0d16ae931b73c59d7e0c089c0");
        assert_eq!(raw[32], b'\n');
    }

    #[test]
    fn replace_last_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&digest(b"a")).unwrap();
        ledger.append(&digest(b"b")).unwrap();

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.read_next().unwrap();
        ledger.replace_last(&digest(b"A")).unwrap();
        // Cursor is unchanged; the next read returns the second record.
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"b")));

        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"A")));
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"b")));
    }

    #[test]
    fn finalize_drops_trailing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");

        let mut ledger = Ledger::open(&path).unwrap();
        for content in [&b"a"[..], b"b", b"c", b"d"] {
            ledger.append(&digest(content)).unwrap();
        }
        ledger.finalize(2).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 66);

        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"a")));
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"b")));
        assert_eq!(ledger.read_next().unwrap(), None);
    }

    #[test]
    fn validate_rejects_off_grid_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");
        std::fs::write(&path, vec![b'0'; 34]).unwrap();

        let err = Ledger::validate(&path).unwrap_err();
        assert!(matches!(err, SyncError::CorruptLedger { len: 34, .. }));
        assert!(matches!(Ledger::open(&path), Err(SyncError::CorruptLedger { .. })));
    }

    #[test]
    fn validate_accepts_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Ledger::validate(&dir.path().join("nonexistent")).is_ok());
    }

    #[test]
    fn read_next_rejects_bad_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");
        let mut raw = vec![b'a'; 33];
        raw[32] = b' ';
        std::fs::write(&path, raw).unwrap();

        let mut ledger = Ledger::open(&path).unwrap();
        assert!(matches!(
            ledger.read_next(),
            Err(SyncError::MalformedRecord { offset: 0, .. })
        ));
    }

    #[test]
    fn read_next_rejects_non_hex_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");
        let mut raw = vec![b'z'; 33];
        raw[32] = b'\n';
        std::fs::write(&path, raw).unwrap();

        let mut ledger = Ledger::open(&path).unwrap();
        assert!(matches!(
            ledger.read_next(),
            Err(SyncError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn interleaved_read_replace_append_keeps_grid() {
        // Mirrors one full engine pass: same, changed, new.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&digest(b"same")).unwrap();
        ledger.append(&digest(b"old")).unwrap();

        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"same")));
        ledger.read_next().unwrap();
        ledger.replace_last(&digest(b"new")).unwrap();
        assert_eq!(ledger.read_next().unwrap(), None);
        ledger.append(&digest(b"appended")).unwrap();
        ledger.finalize(ledger.records_consumed()).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 99);
        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"same")));
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"new")));
        assert_eq!(ledger.read_next().unwrap(), Some(digest(b"appended")));
    }
}
