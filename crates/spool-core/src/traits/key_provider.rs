use crate::error::Result;
use crate::types::SecretKey;

/// Named source of the symmetric key used to encrypt queued payloads
pub trait KeyProvider: Send + Sync {
    /// Name the provider is resolved by (matched case-insensitively)
    fn name(&self) -> &str;

    /// Produce the key
    fn secret_key(&self) -> Result<SecretKey>;
}
