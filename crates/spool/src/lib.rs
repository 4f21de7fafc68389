//! Spool: a durable local forwarding queue
//!
//! Spool buffers events in an embedded LMDB store before forwarding them to
//! a remote sink that may be slow, unavailable, or flaky:
//! - **Enqueue**: each event is committed durably before `send` returns
//! - **Forwarder**: one background thread batches queued events to the sink
//! - **At-least-once**: entries are deleted only after the sink accepts them
//! - **Encryption**: optional ChaCha20-Poly1305 at rest via a key provider
//!
//! # Quick Start
//!
//! ```no_run
//! use spool::prelude::*;
//!
//! struct StdoutSink;
//!
//! impl Sink for StdoutSink {
//!     fn targets(&self) -> Vec<String> {
//!         vec!["stdout".into()]
//!     }
//!
//!     fn deliver(&self, event: &Event) -> Result<()> {
//!         println!("{:?}", event);
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let config = SpoolConfig::new(StoreConfig::new("./spool-data")).with_batch_size(50);
//! let spool = Spool::open(config, Arc::new(StdoutSink), &KeyProviderRegistry::new())?;
//!
//! spool.send(&Event::new(b"hello".to_vec())).await?;
//!
//! spool.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod codec;
pub mod enqueue;
pub mod forwarder;
pub mod key_provider;
pub mod notification;
pub mod prelude;
pub mod spool;

// Re-export core types
pub use spool_core::{
    config::{SpoolConfig, StoreConfig, SyncMode},
    error::{Result, SpoolError},
    traits::{KeyProvider, QueueStore, Sink, Visit},
    types::{Batch, Event, Headers, LockedPass, QueueEntry, SecretKey, StoreStats, GUID_HEADER},
};

// Re-export implementations
pub use spool_lmdb::LmdbQueueStore;

// Re-export main types from this crate
pub use cipher::PayloadCipher;
pub use forwarder::PassOutcome;
pub use key_provider::{EnvKeyProvider, KeyProviderRegistry, StaticKeyProvider};
pub use spool::Spool;
