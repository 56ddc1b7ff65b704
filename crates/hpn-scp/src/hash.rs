//! The fragment hash used to negotiate resume: BLAKE2b-512 over a byte
//! range of a file on disk, emitted as lowercase hex.

use std::io::Read;

use blake2::Blake2b512;
use digest::Digest;

use crate::err::RcpError;

/// Length of a hex-encoded BLAKE2b-512 digest.
pub const HASH_LEN: usize = 128;

/// Reads are buffered at this size.
const READ_CHUNK: usize = 8 * 1024;

/// Hashes the first `len` bytes of `reader` and returns the digest as
/// `HASH_LEN` lowercase hex characters.
///
/// Tracks bytes actually returned by each read rather than assuming a
/// full chunk was read every time, so a short final read does not over-
/// or under-count toward `len`.
pub fn hash_prefix(mut reader: impl Read, len: u64) -> Result<String, RcpError> {
    let mut hasher = Blake2b512::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(READ_CHUNK as u64) as usize;
        let n = reader
            .read(&mut buf[..want])
            .map_err(|e| RcpError::io("<fragment-hash>", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hex::encode(hasher.finalize()))
}

/// An all-zero hash, used when a destination has zero existing bytes.
pub fn empty_hash() -> String {
    hex::encode(Blake2b512::new().finalize())
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hash_len_matches_spec() {
        let got = hash_prefix(Cursor::new(b"hello world".to_vec()), 11).unwrap();
        assert_eq!(got.len(), HASH_LEN);
    }

    #[test]
    fn prefix_hash_ignores_trailing_bytes() {
        let full = hash_prefix(Cursor::new(b"hello".to_vec()), 5).unwrap();
        let prefix = hash_prefix(Cursor::new(b"helloXXXXX".to_vec()), 5).unwrap();
        assert_eq!(full, prefix);
    }

    #[test]
    fn short_read_does_not_panic_or_loop() {
        // Declared length exceeds actual content: must stop at EOF, not
        // spin trying to read bytes that will never arrive.
        let got = hash_prefix(Cursor::new(b"hi".to_vec()), 100).unwrap();
        assert_eq!(got, hash_prefix(Cursor::new(b"hi".to_vec()), 2).unwrap());
    }

    #[test]
    fn empty_hash_matches_zero_length_prefix() {
        assert_eq!(empty_hash(), hash_prefix(Cursor::new(Vec::new()), 0).unwrap());
    }
}
