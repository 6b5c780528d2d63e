use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 4096;

/// SHA-256 over a byte buffer, chunked the way the original `ChecksumService`
/// reads a file — not meaningfully different for in-memory data, kept for
/// parity with how a future streaming implementation would hash.
pub struct Sha256Checksum;

impl Sha256Checksum {
    pub fn digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        for chunk in data.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        hex::encode(hasher.finalize())
    }

    pub fn verify(data: &[u8], expected: &str) -> Result<()> {
        let actual = Self::digest(data);
        if actual == expected {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        let a = Sha256Checksum::digest(b"hello world");
        let b = Sha256Checksum::digest(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn verify_detects_tamper() {
        let digest = Sha256Checksum::digest(b"original bytes");
        assert!(Sha256Checksum::verify(b"original bytes", &digest).is_ok());
        assert!(Sha256Checksum::verify(b"tampered bytes", &digest).is_err());
    }
}
