//! Per-block digest computation using MD4.
//!
//! MD4 is the digest the ledger format is defined over: 128 bits rendered as
//! exactly 32 lowercase hexadecimal characters. It is used purely for
//! equality and change detection between runs, not for integrity protection.

use std::fmt;

use digest::Digest as _;
use md4::Md4;

/// Number of hexadecimal characters in a rendered digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// 128-bit block digest.
///
/// Two blocks compare equal exactly when their digests compare equal; the
/// sync engine never compares block contents directly.
///
/// # Example
///
/// ```rust
/// use blocksync::BlockDigest;
///
/// let digest = BlockDigest::compute(b"hello world");
/// assert_eq!(digest, BlockDigest::compute(b"hello world"));
/// assert_eq!(digest.to_string().len(), 32);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDigest([u8; 16]);

impl BlockDigest {
    /// Compute the MD4 digest of a block.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Md4::digest(data).into())
    }

    /// Compute the digest of an all-zero buffer of `len` bytes.
    ///
    /// Fed to the hasher in fixed chunks so no `len`-sized allocation is
    /// needed. Used to precompute the reference digest that classifies a
    /// block as all-zero in sparse mode.
    #[must_use]
    pub fn of_zeros(len: usize) -> Self {
        let chunk = [0u8; 8192];
        let mut hasher = Md4::new();
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            hasher.update(&chunk[..n]);
            remaining -= n;
        }
        Self(hasher.finalize().into())
    }

    /// Create a digest from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Render the digest as 32 lowercase hexadecimal ASCII bytes.
    #[must_use]
    pub fn hex(&self) -> [u8; DIGEST_HEX_LEN] {
        const TABLE: &[u8; 16] = b"0123456789abcdef";
        let mut out = [0u8; DIGEST_HEX_LEN];
        for (i, byte) in self.0.iter().enumerate() {
            out[2 * i] = TABLE[usize::from(byte >> 4)];
            out[2 * i + 1] = TABLE[usize::from(byte & 0x0f)];
        }
        out
    }

    /// Parse 32 lowercase hexadecimal ASCII bytes back into a digest.
    ///
    /// Returns `None` when the input length is wrong or any character is not
    /// lowercase hex; callers treat that as ledger corruption.
    #[must_use]
    pub fn from_hex(hex: &[u8]) -> Option<Self> {
        fn nibble(c: u8) -> Option<u8> {
            match c {
                b'0'..=b'9' => Some(c - b'0'),
                b'a'..=b'f' => Some(c - b'a' + 10),
                _ => None,
            }
        }

        if hex.len() != DIGEST_HEX_LEN {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, pair) in hex.chunks_exact(2).enumerate() {
            bytes[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockDigest({:08x}...)",
            u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
        )
    }
}

impl AsRef<[u8]> for BlockDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
