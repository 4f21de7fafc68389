//! Shared helpers for spool integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use spool::prelude::*;
use spool::LmdbQueueStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// In-memory sink recording every accepted delivery call
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Vec<Event>>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    targets: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            targets: vec!["collector:4560".into()],
            ..Default::default()
        })
    }

    pub fn without_targets() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::new();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepted delivery calls, one entry per call
    pub fn deliveries(&self) -> Vec<Vec<Event>> {
        self.deliveries.lock().clone()
    }

    /// Every accepted event, flattened
    pub fn events(&self) -> Vec<Event> {
        self.deliveries.lock().iter().flatten().cloned().collect()
    }

    /// Delivery calls made, accepted or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn accept(&self, events: Vec<Event>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpoolError::Delivery("collector unavailable".into()));
        }
        self.deliveries.lock().push(events);
        Ok(())
    }
}

impl Sink for RecordingSink {
    fn targets(&self) -> Vec<String> {
        self.targets.clone()
    }

    fn deliver(&self, event: &Event) -> Result<()> {
        self.accept(vec![event.clone()])
    }

    fn deliver_batch(&self, batch: &Batch) -> Result<()> {
        self.accept(batch.events().to_vec())
    }
}

pub fn store_config(dir: &Path) -> StoreConfig {
    StoreConfig::new(dir).with_map_size(16 * 1024 * 1024)
}

pub fn spool_config(dir: &Path, batch_size: i64, delay: Duration) -> SpoolConfig {
    SpoolConfig::new(store_config(dir))
        .with_batch_size(batch_size)
        .with_delay(delay)
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Open the store directly, bypassing the spool (spool must be dropped)
pub fn open_store(dir: &Path) -> LmdbQueueStore {
    LmdbQueueStore::open(store_config(dir)).unwrap()
}

/// Poll `cond` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Sort events by GUID for order-insensitive comparison
pub fn by_guid(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(|a, b| a.guid().cmp(&b.guid()));
    events
}
