//! Background forwarder
//!
//! One dedicated thread per spool moves entries from the store to the sink.
//! A pass runs when a full batch is queued, or when anything is queued and
//! the pass deadline has passed. Between passes the thread parks on the
//! wake conduit until the deadline or the next producer commit.
//!
//! Two protocols, chosen once from the batch size:
//!
//! - **Batch** (`batch_size > 1`): scan up to a batch without locking,
//!   deliver it as one unit, then delete the delivered keys in one
//!   transaction. A sink failure deletes nothing.
//! - **Single** (`batch_size == 1`): walk the store under a write-locking
//!   cursor, delivering and deleting each entry. A sink failure aborts the
//!   transaction, restoring every entry seen in the pass.
//!
//! Either way a failed delivery is followed by a `delay` pause.

use crate::cipher::PayloadCipher;
use crate::codec;
use crate::notification::WakeQueue;
use parking_lot::{Condvar, Mutex};
use spool_core::{observe, Batch, Event, QueueStore, Result, Sink, Visit};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Result of one forwarding pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The store held nothing despite a nonzero count
    Empty,
    /// Delivery succeeded (or every entry read was unreadable)
    Delivered { delivered: usize, dropped: usize },
    /// The sink rejected the pass; nothing it covered was removed
    Failed,
}

pub struct Forwarder<S: QueueStore> {
    name: String,
    store: Arc<S>,
    sink: Arc<dyn Sink>,
    cipher: PayloadCipher,
    wake: Arc<WakeQueue>,
    shutdown: Arc<AtomicBool>,
    batch_size: usize,
    delay: Duration,
}

impl<S: QueueStore> Forwarder<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        store: Arc<S>,
        sink: Arc<dyn Sink>,
        cipher: PayloadCipher,
        wake: Arc<WakeQueue>,
        shutdown: Arc<AtomicBool>,
        batch_size: usize,
        delay: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            sink,
            cipher,
            wake,
            shutdown,
            batch_size: batch_size.max(1),
            delay,
        }
    }

    /// Start the loop on its own thread
    pub fn spawn(self) -> Result<ForwarderHandle> {
        let exit = Arc::new(ExitSignal::default());
        let signal = exit.clone();
        let thread = std::thread::Builder::new()
            .name("spool-forwarder".into())
            .spawn(move || {
                let _exit = ExitGuard(signal);
                self.run()
            })?;
        Ok(ForwarderHandle {
            thread: Some(thread),
            exit,
        })
    }

    /// Run until shutdown is raised or the store becomes unreadable
    pub fn run(self) {
        let span = tracing::info_span!("forwarder", name = %self.name);
        let _enter = span.enter();

        tracing::debug!(
            batch_size = self.batch_size,
            delay_ms = self.delay.as_millis() as u64,
            "Forwarder started"
        );

        let mut next_pass = Instant::now() + self.delay;
        let mut idle = true;

        while !self.shutdown.load(Ordering::SeqCst) {
            let count = self.store.count();
            observe::set_queue_depth(count);
            let now = Instant::now();

            if count == 0 {
                idle = true;
                self.wake.wait_until(now + self.delay);
                continue;
            }

            // The oldest entry of a new burst waits at most `delay`
            if idle {
                idle = false;
                next_pass = now + self.delay;
            }

            if count < self.batch_size && now < next_pass {
                self.wake.wait_until(next_pass);
                continue;
            }

            next_pass = now + self.delay;
            self.wake.clear();

            match self.forward_once() {
                Ok(PassOutcome::Delivered { .. }) => {}
                Ok(PassOutcome::Empty) => {
                    idle = true;
                    self.wake.wait_until(Instant::now() + self.delay);
                }
                Ok(PassOutcome::Failed) => {
                    self.wake.sleep_unless(self.delay, &self.shutdown);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Unable to read queue store, forwarder stopping");
                    self.shutdown.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }

        tracing::debug!("Forwarder exiting");
    }

    /// Run a single pass with the configured protocol
    ///
    /// An error means the store itself could not be read.
    pub fn forward_once(&self) -> Result<PassOutcome> {
        let start = Instant::now();
        let outcome = if self.batch_size > 1 {
            self.forward_batch()?
        } else {
            self.forward_single()?
        };

        match outcome {
            PassOutcome::Empty => {
                let actual = self.store.resync()?;
                observe::set_queue_depth(actual);
            }
            PassOutcome::Delivered { delivered, dropped } => {
                observe::record_pass(start.elapsed(), delivered as u64, true);
                observe::record_dropped(dropped as u64);
                tracing::debug!(delivered, dropped, "Forwarding pass complete");
            }
            PassOutcome::Failed => {
                observe::record_pass(start.elapsed(), 0, false);
            }
        }
        Ok(outcome)
    }

    fn forward_batch(&self) -> Result<PassOutcome> {
        let entries = self.store.scan(self.batch_size)?;
        if entries.is_empty() {
            return Ok(PassOutcome::Empty);
        }

        let mut batch = Batch::with_capacity(entries.len());
        let mut keys = Vec::with_capacity(entries.len());
        let mut corrupt = Vec::new();
        for entry in entries {
            match self.open_entry(&entry.value) {
                Ok(event) => {
                    batch.push(event);
                    keys.push(entry.key);
                }
                Err(e) => {
                    tracing::error!(
                        key = %entry.key_lossy(),
                        error = %e,
                        "Dropping unreadable queue entry"
                    );
                    corrupt.push(entry.key);
                }
            }
        }

        if !batch.is_empty() {
            if let Err(e) = self.sink.deliver_batch(&batch) {
                tracing::error!(
                    count = batch.len(),
                    error = %e,
                    "Unable to deliver batch, will retry"
                );
                return Ok(PassOutcome::Failed);
            }
        }

        let delivered = batch.len();
        let dropped = corrupt.len();
        keys.append(&mut corrupt);

        match self.store.delete_many(&keys) {
            Ok(removed) if removed < keys.len() => {
                tracing::warn!(
                    expected = keys.len(),
                    removed,
                    "Some delivered entries were not removed"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    count = keys.len(),
                    error = %e,
                    "Unable to remove delivered entries, they will be redelivered"
                );
            }
        }

        Ok(PassOutcome::Delivered { delivered, dropped })
    }

    fn forward_single(&self) -> Result<PassOutcome> {
        let mut delivered = 0;
        let mut dropped = 0;
        let mut failed = false;

        // Holds the store's write lock for the whole walk, including sink calls
        let pass = self.store.drain_locked(&mut |key, value| {
            if self.shutdown.load(Ordering::SeqCst) {
                return Visit::Stop;
            }

            let event = match self.open_entry(value) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(
                        key = %String::from_utf8_lossy(key),
                        error = %e,
                        "Dropping unreadable queue entry"
                    );
                    dropped += 1;
                    return Visit::Delete;
                }
            };

            match self.sink.deliver(&event) {
                Ok(()) => {
                    delivered += 1;
                    Visit::Delete
                }
                Err(e) => {
                    tracing::error!(
                        key = %String::from_utf8_lossy(key),
                        error = %e,
                        "Unable to deliver event, will retry"
                    );
                    failed = true;
                    Visit::Abort
                }
            }
        })?;

        if failed {
            tracing::debug!(
                restored = pass.visited,
                "Forwarding pass aborted, entries restored"
            );
            return Ok(PassOutcome::Failed);
        }
        if pass.visited == 0 {
            return Ok(PassOutcome::Empty);
        }
        Ok(PassOutcome::Delivered { delivered, dropped })
    }

    /// Decrypt and decode a stored value
    fn open_entry(&self, value: &[u8]) -> Result<Event> {
        let frame = self.cipher.decrypt(value)?;
        codec::decode(&frame)
    }
}

/// Raised when the forwarder thread exits, including by panic
#[derive(Default)]
struct ExitSignal {
    exited: Mutex<bool>,
    cond: Condvar,
}

impl ExitSignal {
    /// Block until the thread has exited or `timeout` elapses
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut exited = self.exited.lock();
        while !*exited {
            if self.cond.wait_until(&mut exited, deadline).timed_out() {
                break;
            }
        }
        *exited
    }
}

struct ExitGuard(Arc<ExitSignal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        *self.0.exited.lock() = true;
        self.0.cond.notify_all();
    }
}

/// Owner's handle on the forwarder thread
pub struct ForwarderHandle {
    thread: Option<JoinHandle<()>>,
    exit: Arc<ExitSignal>,
}

impl ForwarderHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the thread to exit, up to `timeout`
    ///
    /// Returns false if the thread was still running at the deadline; it is
    /// then left detached.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        if self.thread.is_none() {
            return true;
        }
        let exit = self.exit.clone();
        let exited = tokio::task::spawn_blocking(move || exit.wait(timeout))
            .await
            .unwrap_or(false);
        self.finish(exited, timeout)
    }

    /// Blocking variant of [`join`](Self::join) for use outside a runtime
    pub fn join_blocking(&mut self, timeout: Duration) -> bool {
        if self.thread.is_none() {
            return true;
        }
        let exited = self.exit.wait(timeout);
        self.finish(exited, timeout)
    }

    fn finish(&mut self, exited: bool, timeout: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        if !exited {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Forwarder did not stop in time"
            );
            return false;
        }
        if thread.join().is_err() {
            tracing::error!("Forwarder thread panicked");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Wake;
    use spool_core::{LockedPass, QueueEntry, SecretKey, SpoolError, StoreConfig, StoreStats};
    use std::sync::atomic::AtomicUsize;
    use spool_lmdb::LmdbQueueStore;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<Event>>>,
        fail: AtomicBool,
        fail_on_body: Mutex<Option<Vec<u8>>>,
    }

    impl Sink for RecordingSink {
        fn targets(&self) -> Vec<String> {
            vec!["memory".into()]
        }

        fn deliver(&self, event: &Event) -> Result<()> {
            if self.fail.load(Ordering::SeqCst)
                || self.fail_on_body.lock().as_deref() == Some(event.body.as_slice())
            {
                return Err(SpoolError::Delivery("sink down".into()));
            }
            self.batches.lock().push(vec![event.clone()]);
            Ok(())
        }

        fn deliver_batch(&self, batch: &Batch) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SpoolError::Delivery("sink down".into()));
            }
            self.batches.lock().push(batch.events().to_vec());
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<LmdbQueueStore>,
        sink: Arc<RecordingSink>,
        cipher: PayloadCipher,
        _dir: TempDir,
    }

    impl Fixture {
        fn new(cipher: PayloadCipher) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cfg = StoreConfig::new(dir.path()).with_map_size(16 * 1024 * 1024);
            Self {
                store: Arc::new(LmdbQueueStore::open(cfg).unwrap()),
                sink: Arc::new(RecordingSink::default()),
                cipher,
                _dir: dir,
            }
        }

        fn forwarder(&self, batch_size: usize) -> Forwarder<LmdbQueueStore> {
            Forwarder::new(
                "test",
                self.store.clone(),
                self.sink.clone(),
                self.cipher.clone(),
                Arc::new(WakeQueue::new()),
                Arc::new(AtomicBool::new(false)),
                batch_size,
                Duration::from_millis(10),
            )
        }

        fn put(&self, key: &str, body: &[u8]) -> Event {
            let event = Event::from_parts(body.to_vec(), Default::default())
                .with_header(spool_core::GUID_HEADER, key);
            let value = self.cipher.encrypt(&codec::encode(&event).unwrap()).unwrap();
            self.store.put(key.as_bytes(), &value).unwrap();
            event
        }
    }

    #[test]
    fn test_batch_pass_delivers_and_deletes() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        let e1 = fx.put("k1", b"one");
        let e2 = fx.put("k2", b"two");
        fx.put("k3", b"three");

        let outcome = fx.forwarder(2).forward_once().unwrap();
        assert_eq!(
            outcome,
            PassOutcome::Delivered {
                delivered: 2,
                dropped: 0
            }
        );
        assert_eq!(*fx.sink.batches.lock(), vec![vec![e1, e2]]);

        let remaining = fx.store.scan(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, b"k3");
        assert_eq!(fx.store.count(), 1);
    }

    #[test]
    fn test_batch_pass_failure_keeps_entries() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        fx.put("k1", b"one");
        fx.put("k2", b"two");
        fx.sink.fail.store(true, Ordering::SeqCst);

        let outcome = fx.forwarder(5).forward_once().unwrap();
        assert_eq!(outcome, PassOutcome::Failed);
        assert_eq!(fx.store.count(), 2);
        assert!(fx.sink.batches.lock().is_empty());
    }

    #[test]
    fn test_batch_pass_drops_corrupt_entries() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        let good = fx.put("k1", b"good");
        fx.store.put(b"k2", &[0xff, 0xff, 0xff, 0xff]).unwrap();

        let outcome = fx.forwarder(5).forward_once().unwrap();
        assert_eq!(
            outcome,
            PassOutcome::Delivered {
                delivered: 1,
                dropped: 1
            }
        );
        assert_eq!(*fx.sink.batches.lock(), vec![vec![good]]);
        assert_eq!(fx.store.count(), 0);
    }

    #[test]
    fn test_all_corrupt_batch_skips_sink() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        fx.store.put(b"bad", b"\x00\x00\x00\x09short").unwrap();

        let outcome = fx.forwarder(5).forward_once().unwrap();
        assert_eq!(
            outcome,
            PassOutcome::Delivered {
                delivered: 0,
                dropped: 1
            }
        );
        assert!(fx.sink.batches.lock().is_empty());
        assert_eq!(fx.store.count(), 0);
    }

    #[test]
    fn test_single_pass_delivers_in_key_order() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        let b = fx.put("b", b"second");
        let a = fx.put("a", b"first");

        let outcome = fx.forwarder(1).forward_once().unwrap();
        assert_eq!(
            outcome,
            PassOutcome::Delivered {
                delivered: 2,
                dropped: 0
            }
        );
        assert_eq!(*fx.sink.batches.lock(), vec![vec![a], vec![b]]);
        assert_eq!(fx.store.count(), 0);
    }

    #[test]
    fn test_single_pass_failure_restores_whole_pass() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        fx.put("a", b"ok-1");
        fx.put("b", b"ok-2");
        fx.put("c", b"poison");
        fx.put("d", b"never-reached");
        *fx.sink.fail_on_body.lock() = Some(b"poison".to_vec());

        let outcome = fx.forwarder(1).forward_once().unwrap();
        assert_eq!(outcome, PassOutcome::Failed);
        // Everything considered in the pass is back, nothing past the failure was sent
        assert_eq!(fx.store.count(), 4);
        assert_eq!(fx.store.scan(10).unwrap().len(), 4);
        assert_eq!(fx.sink.batches.lock().len(), 2);
    }

    #[test]
    fn test_encrypted_entries_are_delivered_in_plaintext() {
        let fx = Fixture::new(PayloadCipher::new(Some(SecretKey::generate())));
        let event = fx.put("k1", b"secret body");

        let stored = fx.store.scan(1).unwrap();
        assert_ne!(stored[0].value, codec::encode(&event).unwrap());

        fx.forwarder(3).forward_once().unwrap();
        assert_eq!(*fx.sink.batches.lock(), vec![vec![event]]);
    }

    /// Reports queued entries it does not have
    struct OverstatedStore {
        passes: AtomicUsize,
    }

    impl QueueStore for OverstatedStore {
        fn open(_cfg: StoreConfig) -> Result<Self> {
            Ok(Self {
                passes: AtomicUsize::new(0),
            })
        }

        fn put(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
            Ok(())
        }

        fn scan(&self, _limit: usize) -> Result<Vec<QueueEntry>> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn delete_many(&self, _keys: &[Vec<u8>]) -> Result<usize> {
            Ok(0)
        }

        fn drain_locked(
            &self,
            _visit: &mut dyn FnMut(&[u8], &[u8]) -> Visit,
        ) -> Result<LockedPass> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            Ok(LockedPass {
                committed: true,
                ..Default::default()
            })
        }

        fn count(&self) -> usize {
            3
        }

        fn stats(&self) -> StoreStats {
            StoreStats::default()
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn passes_against_overstated_count(batch_size: usize) -> usize {
        let store = Arc::new(OverstatedStore::open(StoreConfig::new("unused")).unwrap());
        let wake = Arc::new(WakeQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let forwarder = Forwarder::new(
            "test",
            store.clone(),
            Arc::new(RecordingSink::default()),
            PayloadCipher::plaintext(),
            wake.clone(),
            shutdown.clone(),
            batch_size,
            Duration::from_millis(50),
        );

        let mut handle = forwarder.spawn().unwrap();
        std::thread::sleep(Duration::from_millis(300));
        shutdown.store(true, Ordering::SeqCst);
        wake.notify_shutdown();
        assert!(handle.join_blocking(Duration::from_secs(5)));

        store.passes.load(Ordering::SeqCst)
    }

    #[test]
    fn test_empty_single_pass_waits_for_delay() {
        let passes = passes_against_overstated_count(1);
        assert!(passes >= 1);
        assert!(passes <= 10, "forwarder spun through {} empty passes", passes);
    }

    #[test]
    fn test_empty_batch_pass_waits_for_delay() {
        let passes = passes_against_overstated_count(2);
        assert!(passes >= 1);
        assert!(passes <= 10, "forwarder spun through {} empty passes", passes);
    }

    #[test]
    fn test_empty_pass_outcome() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        assert_eq!(fx.forwarder(1).forward_once().unwrap(), PassOutcome::Empty);
        assert_eq!(fx.forwarder(4).forward_once().unwrap(), PassOutcome::Empty);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_reports_timeout_then_exit() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        let wake = Arc::new(WakeQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let forwarder = Forwarder::new(
            "test",
            fx.store.clone(),
            fx.sink.clone(),
            PayloadCipher::plaintext(),
            wake.clone(),
            shutdown.clone(),
            10,
            Duration::from_secs(30),
        );

        let mut handle = forwarder.spawn().unwrap();
        assert!(!handle.exit.wait(Duration::from_millis(20)));

        shutdown.store(true, Ordering::SeqCst);
        wake.notify_shutdown();
        assert!(handle.join(Duration::from_secs(5)).await);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_run_exits_on_shutdown() {
        let fx = Fixture::new(PayloadCipher::plaintext());
        let wake = Arc::new(WakeQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let forwarder = Forwarder::new(
            "test",
            fx.store.clone(),
            fx.sink.clone(),
            PayloadCipher::plaintext(),
            wake.clone(),
            shutdown.clone(),
            10,
            Duration::from_secs(30),
        );

        let mut handle = forwarder.spawn().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        shutdown.store(true, Ordering::SeqCst);
        wake.notify(Wake::Shutdown);
        assert!(handle.join_blocking(Duration::from_secs(5)));
    }
}
