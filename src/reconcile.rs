//! Post-loop size reconciliation of the ledger and the destination.

use crate::dest::Destination;
use crate::engine::SyncOptions;
use crate::error::Result;
use crate::ledger::Ledger;

/// Fix-up applied after the block loop.
///
/// The final logical length is the total number of bytes consumed from the
/// source. The reconciler trims the ledger's stale tail, forces the correct
/// destination length when sparse holes were left at the end, and applies
/// final truncation.
#[derive(Debug, Clone, Copy)]
pub struct SizeReconciler {
    final_len: u64,
    block_count: u64,
}

impl SizeReconciler {
    /// Capture the end-of-loop totals.
    #[must_use]
    pub const fn new(final_len: u64, block_count: u64) -> Self {
        Self {
            final_len,
            block_count,
        }
    }

    /// Finalize both files.
    ///
    /// The ledger is always truncated to exactly `block_count` records. With
    /// a destination present (i.e. not rebuild-only): in sparse mode a single
    /// sentinel byte is written at exactly the final-length offset, because
    /// trailing sparse skips never extend the file; with truncation enabled
    /// the destination is then cut to exactly the final length, which also
    /// removes the sentinel. With truncation disabled the destination keeps
    /// whatever length it has, sentinel included.
    ///
    /// # Errors
    ///
    /// Fails on ledger truncation, sentinel write, or destination truncation
    /// errors.
    pub fn reconcile(
        &self,
        ledger: &mut Ledger,
        dest: Option<&mut Destination>,
        options: &SyncOptions,
    ) -> Result<()> {
        ledger.finalize(self.block_count)?;

        let Some(dest) = dest else {
            return Ok(());
        };

        if options.sparse {
            tracing::debug!(offset = self.final_len, "fixing sparse file length");
            dest.write_sentinel(self.final_len)?;
        }

        if options.truncate {
            tracing::debug!(
                path = %dest.path().display(),
                len = self.final_len,
                "truncating destination"
            );
            dest.truncate(self.final_len)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(sparse: bool, truncate: bool) -> SyncOptions {
        SyncOptions {
            block_size: 1024,
            sparse,
            rebuild_only: false,
            truncate,
        }
    }

    fn fixture(dir: &tempfile::TempDir, ledger_records: u64, dest_len: usize) -> (Ledger, Destination) {
        let ledger_path = dir.path().join("ledger");
        let mut ledger = Ledger::open(&ledger_path).unwrap();
        for i in 0..ledger_records {
            ledger
                .append(&crate::digest::BlockDigest::compute(&i.to_le_bytes()))
                .unwrap();
        }
        let dest_path = dir.path().join("dest");
        std::fs::write(&dest_path, vec![1u8; dest_len]).unwrap();
        let dest = Destination::open(&dest_path, false).unwrap();
        (ledger, dest)
    }

    #[test]
    fn trims_ledger_tail_and_truncates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, mut dest) = fixture(&dir, 5, 5000);

        SizeReconciler::new(2048, 2)
            .reconcile(&mut ledger, Some(&mut dest), &options(false, true))
            .unwrap();

        assert_eq!(std::fs::metadata(dir.path().join("ledger")).unwrap().len(), 66);
        assert_eq!(std::fs::metadata(dir.path().join("dest")).unwrap().len(), 2048);
    }

    #[test]
    fn sparse_sentinel_is_removed_by_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, mut dest) = fixture(&dir, 1, 0);

        SizeReconciler::new(4096, 1)
            .reconcile(&mut ledger, Some(&mut dest), &options(true, true))
            .unwrap();

        // Sentinel forced the length past 4096, truncation cut it back.
        let content = std::fs::read(dir.path().join("dest")).unwrap();
        assert_eq!(content.len(), 4096);
        assert!(content.iter().all(|&b| b == 0));
    }

    #[test]
    fn sparse_sentinel_remains_without_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, mut dest) = fixture(&dir, 1, 0);

        SizeReconciler::new(4096, 1)
            .reconcile(&mut ledger, Some(&mut dest), &options(true, false))
            .unwrap();

        assert_eq!(std::fs::metadata(dir.path().join("dest")).unwrap().len(), 4097);
    }

    #[test]
    fn no_truncation_preserves_longer_destination() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, mut dest) = fixture(&dir, 1, 9000);

        SizeReconciler::new(1024, 1)
            .reconcile(&mut ledger, Some(&mut dest), &options(false, false))
            .unwrap();

        assert_eq!(std::fs::metadata(dir.path().join("dest")).unwrap().len(), 9000);
    }

    #[test]
    fn rebuild_only_touches_ledger_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ledger, _dest) = fixture(&dir, 3, 7777);

        SizeReconciler::new(2048, 2)
            .reconcile(&mut ledger, None, &options(true, true))
            .unwrap();

        assert_eq!(std::fs::metadata(dir.path().join("ledger")).unwrap().len(), 66);
        assert_eq!(std::fs::metadata(dir.path().join("dest")).unwrap().len(), 7777);
    }
}
