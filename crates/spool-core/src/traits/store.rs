use crate::config::StoreConfig;
use crate::error::Result;
use crate::types::{LockedPass, QueueEntry, StoreStats};

/// Decision returned by a locked-drain visitor for the current entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Delete the entry through the locking cursor and continue
    Delete,
    /// Leave the entry in place and continue
    Keep,
    /// Stop iterating and commit everything decided so far
    Stop,
    /// Stop iterating and abort the transaction, restoring every entry
    Abort,
}

/// Durable ordered queue of encoded events
///
/// Provides:
/// - Durable single-entry puts, each its own committed transaction
/// - Non-locking ordered scans
/// - All-or-nothing multi-key deletes
/// - Locked drains that hold one write transaction across a visitor
///
/// All concurrent access goes through the backend's own transaction
/// manager; callers never add locking of their own.
pub trait QueueStore: Send + Sync + 'static {
    /// Open a queue store, creating it if missing
    fn open(cfg: StoreConfig) -> Result<Self>
    where
        Self: Sized;

    /// Commit `value` under `key` durably before returning
    ///
    /// Safe to call from many threads at once; each call is serialized by
    /// the store's writer lock.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Read up to `limit` entries in key order without deleting them
    fn scan(&self, limit: usize) -> Result<Vec<QueueEntry>>;

    /// Delete `keys` in one transaction, returning how many were removed
    ///
    /// Individual delete failures are logged and the key is left for a
    /// later pass; only a failed commit is returned as an error.
    fn delete_many(&self, keys: &[Vec<u8>]) -> Result<usize>;

    /// Walk the queue in key order under a write-locking cursor
    ///
    /// The visitor sees each `(key, value)` and decides its fate. Unless it
    /// returns [`Visit::Abort`] the transaction commits at the end of the
    /// walk. Concurrent puts block for the duration of the drain.
    fn drain_locked(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Visit) -> Result<LockedPass>;

    /// Approximate number of queued entries
    ///
    /// Never lower than the number of undelivered entries.
    fn count(&self) -> usize;

    /// Recount the queue from the store and reset [`count`](Self::count)
    ///
    /// Must not run concurrently with deletes. Backends with an exact
    /// counter can keep the default.
    fn resync(&self) -> Result<usize> {
        Ok(self.count())
    }

    /// Counters since open
    fn stats(&self) -> StoreStats;

    /// Flush and close the store; later operations fail
    fn close(&self) -> Result<()>;
}
