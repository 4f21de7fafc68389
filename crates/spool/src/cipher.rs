//! At-rest encryption of queued frames
//!
//! ChaCha20-Poly1305 with a fresh random nonce per value. The stored bytes
//! are `nonce (12) | ciphertext + tag`. Without a key both directions are
//! the identity.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use spool_core::{Result, SecretKey, SpoolError};

/// Nonce size for ChaCha20-Poly1305 (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Symmetric cipher applied to frames on their way in and out of the store
#[derive(Clone)]
pub struct PayloadCipher {
    cipher: Option<ChaCha20Poly1305>,
}

impl PayloadCipher {
    pub fn new(key: Option<SecretKey>) -> Self {
        Self {
            cipher: key.map(|k| ChaCha20Poly1305::new(Key::from_slice(k.as_bytes()))),
        }
    }

    /// Cipher that passes bytes through unchanged
    pub fn plaintext() -> Self {
        Self { cipher: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_vec());
        };

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| SpoolError::Cipher(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, stored: &[u8]) -> Result<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(stored.to_vec());
        };

        if stored.len() < NONCE_SIZE {
            return Err(SpoolError::Cipher(format!(
                "value of {} bytes is shorter than the nonce",
                stored.len()
            )));
        }
        let (nonce, ciphertext) = stored.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SpoolError::Cipher(e.to_string()))
    }
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
