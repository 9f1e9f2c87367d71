//! Sequential block reading from the source file.

use std::io::{ErrorKind, Read};

/// Sequential reader producing fixed-size blocks from a source stream.
///
/// The sequence is lazy, finite, and non-restartable: each call to
/// [`read_block`](Self::read_block) consumes the next block. The final block
/// may be shorter than the buffer; a return of zero bytes signals the end of
/// the sequence. A read error is fatal to the run, because resuming mid-block
/// would desynchronize the ledger cursor from the source cursor.
#[derive(Debug)]
pub struct BlockReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> BlockReader<R> {
    /// Wrap a source stream.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Total bytes consumed from the source so far.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` with the next block.
    ///
    /// Loops over short reads until the buffer is full or the stream ends, so
    /// a block is only ever short at end of file. Returns the number of bytes
    /// placed in `buf`; zero means the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error. `ErrorKind::Interrupted` reads are
    /// retried, everything else aborts.
    pub fn read_block(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }
}
