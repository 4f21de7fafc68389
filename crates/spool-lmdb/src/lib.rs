//! LMDB-backed queue store implementation
//!
//! Holds encoded events in a single named LMDB database keyed by GUID.
//!
//! Key features:
//! - One durable write transaction per put
//! - Key-ordered scans on read transactions
//! - All-or-nothing batch deletes
//! - Locked drains holding a write cursor across delivery
//! - Entry count kept in memory, seeded by a cursor walk at open

pub mod store;

pub use store::LmdbQueueStore;
