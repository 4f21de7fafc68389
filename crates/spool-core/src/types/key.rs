use crate::error::{Result, SpoolError};
use rand::RngCore;

/// Key size for the payload cipher (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Symmetric key used to encrypt queued payloads at rest
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Create from existing key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            SpoolError::KeyProvider(format!(
                "Invalid key size: expected {}, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}
