//! Spool Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use spool::prelude::*;
//! ```

// Core types
pub use crate::{Batch, Event, Headers, Result, SecretKey, Spool, SpoolError, GUID_HEADER};

// Configs
pub use crate::{SpoolConfig, StoreConfig, SyncMode};

// Traits
pub use crate::{KeyProvider, QueueStore, Sink};

// Key providers
pub use crate::{EnvKeyProvider, KeyProviderRegistry, StaticKeyProvider};

// Re-export common external deps
pub use std::sync::Arc;
pub use tracing;
