pub mod checksum;
pub mod cipher;
pub mod compression;

pub use checksum::Sha256Checksum;
pub use cipher::AesGcmCipher;
pub use compression::{compress, decompress};

use crate::config::Config;
use crate::error::Result;
use crate::model::{Server, ServerCredentials};

/// Decrypts a Server's credential envelope using the process-wide encryption
/// key and salt. Shared by the worker pool and health prober so both build
/// executors from the same credential decoding path.
pub fn decrypt_server_credentials(config: &Config, server: &Server) -> Result<ServerCredentials> {
    let cipher = AesGcmCipher::new(&config.encryption_key, &config.encryption_salt)?;
    let bytes = cipher.decrypt(&server.credentials_ciphertext)?;
    let stored: StoredCredentials = serde_json::from_slice(&bytes)?;
    Ok(stored.into())
}

#[derive(serde::Deserialize)]
struct StoredCredentials {
    username: Option<String>,
    password: Option<String>,
    private_key: Option<String>,
}

impl From<StoredCredentials> for ServerCredentials {
    fn from(value: StoredCredentials) -> Self {
        ServerCredentials {
            username: value.username,
            password: value.password,
            private_key: value.private_key,
        }
    }
}
