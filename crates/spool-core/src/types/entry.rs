use serde::{Deserialize, Serialize};

/// A queued (key, frame) pair as held in the store
///
/// The key is the event's GUID bytes; the value is the encoded frame,
/// possibly encrypted. Entries are never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl QueueEntry {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Key rendered for log output
    pub fn key_lossy(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

/// Outcome of a locked drain over the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockedPass {
    /// Entries handed to the visitor
    pub visited: usize,

    /// Entries deleted through the cursor (only durable if committed)
    pub deleted: usize,

    /// Whether the transaction was committed (false means aborted)
    pub committed: bool,
}

/// Counters describing a store since it was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Approximate number of queued entries
    pub entries: usize,

    /// Committed puts since open
    pub puts: u64,

    /// Committed deletes since open
    pub deletes: u64,

    /// Transactions that failed to commit since open
    pub failed_commits: u64,
}
