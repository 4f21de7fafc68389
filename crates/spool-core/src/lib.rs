//! Spool Core: Traits and types for the spool durable forwarding queue
//!
//! This crate defines the core abstractions shared by the store backends
//! and the forwarding engine:
//! - Queue store: Transactional ordered KV holding encoded events until delivery
//! - Sink: The remote delivery target consuming forwarded events and batches
//! - Key provider: Optional source of the symmetric key for at-rest encryption
//!
//! Key guarantees:
//! - Write-ahead durability: an event is committed before the producer returns
//! - At-least-once delivery: entries are deleted only after confirmed delivery
//! - Crash safety: uncommitted deletes leave entries queued for redelivery

pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{SpoolConfig, StoreConfig, SyncMode};
pub use error::{Result, SpoolError};
pub use traits::{KeyProvider, QueueStore, Sink, Visit};
pub use types::{Batch, Event, Headers, LockedPass, QueueEntry, SecretKey, StoreStats, GUID_HEADER};
