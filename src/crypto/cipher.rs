use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha256;

use crate::error::{Error, Result};

const PBKDF2_ITERATIONS: u32 = 100_000;
const NONCE_LEN: usize = 12;

/// AES-256-GCM encryption with a PBKDF2-HMAC-SHA256 derived key.
///
/// Ciphertext layout is `nonce (12 bytes) || aes-gcm output`, matching the
/// original platform's `EncryptionService` so restores of backups taken before
/// this rewrite remain decryptable given the same key and salt.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(passphrase: &str, salt: &str) -> Result<Self> {
        let mut key_bytes = [0u8; 32];
        pbkdf2::<Hmac<Sha256>>(
            passphrase.as_bytes(),
            salt.as_bytes(),
            PBKDF2_ITERATIONS,
            &mut key_bytes,
        )
        .map_err(|e| Error::Crypto(format!("key derivation failed: {e}")))?;

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::Crypto(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_LEN {
            return Err(Error::Crypto("ciphertext shorter than nonce".to_string()));
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Crypto(format!("decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let cipher = AesGcmCipher::new("hunter2", "some-salt").unwrap();
        let plaintext = b"pg_dump output goes here";
        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = cipher.decrypt(&ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let cipher = AesGcmCipher::new("hunter2", "some-salt").unwrap();
        let ciphertext = cipher.encrypt(b"secret").unwrap();

        let other = AesGcmCipher::new("wrong", "some-salt").unwrap();
        assert!(other.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn truncated_payload_rejected() {
        let cipher = AesGcmCipher::new("hunter2", "some-salt").unwrap();
        assert!(cipher.decrypt(&[0u8; 4]).is_err());
    }
}
