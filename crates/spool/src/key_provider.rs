//! Key provider registry
//!
//! Providers are registered up front and looked up by the name configured
//! in [`SpoolConfig::key_provider`](spool_core::SpoolConfig). Resolution
//! never fails startup: an unknown name or a failing provider disables
//! encryption with a logged error.
//!
//! # Example
//!
//! ```ignore
//! let mut keys = KeyProviderRegistry::new();
//! keys.register(Box::new(EnvKeyProvider::new("env", "SPOOL_KEY")));
//!
//! let spool = Spool::open(config.with_key_provider("env"), sink, &keys)?;
//! ```

use spool_core::{KeyProvider, Result, SecretKey, SpoolError};
use std::collections::HashMap;

/// Registry of key providers, keyed by lower-cased name
#[derive(Default)]
pub struct KeyProviderRegistry {
    providers: HashMap<String, Box<dyn KeyProvider>>,
}

impl KeyProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any with the same name
    pub fn register(&mut self, provider: Box<dyn KeyProvider>) {
        let name = provider.name().to_lowercase();
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Option<&dyn KeyProvider> {
        self.providers.get(&name.to_lowercase()).map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve the configured provider to a key
    ///
    /// Returns `None` (plaintext storage) when no provider is configured,
    /// the name is unknown, or the provider fails.
    pub fn resolve(&self, name: Option<&str>) -> Option<SecretKey> {
        let name = name?;

        let Some(provider) = self.get(name) else {
            tracing::error!(
                provider = %name,
                "Unable to find key provider, encryption disabled"
            );
            return None;
        };

        match provider.secret_key() {
            Ok(key) => {
                tracing::info!(provider = %provider.name(), "Payload encryption enabled");
                Some(key)
            }
            Err(e) => {
                tracing::error!(
                    provider = %provider.name(),
                    error = %e,
                    "Unable to obtain key from provider, encryption disabled"
                );
                None
            }
        }
    }
}

/// Provider returning a fixed key
pub struct StaticKeyProvider {
    name: String,
    key: SecretKey,
}

impl StaticKeyProvider {
    pub fn new(name: impl Into<String>, key: SecretKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn secret_key(&self) -> Result<SecretKey> {
        Ok(self.key.clone())
    }
}

/// Provider reading a hex-encoded key from an environment variable
pub struct EnvKeyProvider {
    name: String,
    var: String,
}

impl EnvKeyProvider {
    pub fn new(name: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var: var.into(),
        }
    }
}

impl KeyProvider for EnvKeyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn secret_key(&self) -> Result<SecretKey> {
        let value = std::env::var(&self.var)
            .map_err(|e| SpoolError::KeyProvider(format!("{}: {}", self.var, e)))?;
        parse_hex_key(value.trim())
    }
}

/// Parse a 64-character hex string into a key
pub fn parse_hex_key(s: &str) -> Result<SecretKey> {
    let bytes = hex::decode(s).map_err(|e| SpoolError::KeyProvider(e.to_string()))?;
    SecretKey::from_bytes(&bytes)
}
