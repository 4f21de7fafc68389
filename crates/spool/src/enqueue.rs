//! Producer-facing enqueue path
//!
//! The store commit runs on tokio's blocking pool. The producer only awaits
//! the join handle, so dropping the producer's future or timing out its
//! wait never aborts a commit that has already been submitted.

use crate::cipher::PayloadCipher;
use crate::codec;
use crate::notification::{Wake, WakeQueue};
use spool_core::{observe, Event, QueueStore, Result, SpoolError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Number of times the producer waits for its commit before giving up
const COMMIT_WAIT_ATTEMPTS: u32 = 2;

/// Submitted commits that have not finished
#[derive(Default)]
struct Commits {
    running: AtomicUsize,
    idle: Notify,
}

/// One running commit, released on drop
struct InFlight(Arc<Commits>);

impl InFlight {
    fn enter(commits: &Arc<Commits>) -> Self {
        commits.running.fetch_add(1, Ordering::SeqCst);
        Self(commits.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct Enqueuer<S: QueueStore> {
    store: Arc<S>,
    cipher: PayloadCipher,
    wake: Arc<WakeQueue>,
    shutdown: Arc<AtomicBool>,
    commits: Arc<Commits>,
    commit_wait: Duration,
}

impl<S: QueueStore> Enqueuer<S> {
    pub fn new(
        store: Arc<S>,
        cipher: PayloadCipher,
        wake: Arc<WakeQueue>,
        shutdown: Arc<AtomicBool>,
        commit_wait: Duration,
    ) -> Self {
        Self {
            store,
            cipher,
            wake,
            shutdown,
            commits: Arc::new(Commits::default()),
            commit_wait,
        }
    }

    /// Durably queue an event
    ///
    /// Returns once the entry is committed. Fails with
    /// [`SpoolError::QueueUnavailable`] after shutdown and with
    /// [`SpoolError::DeliveryQueue`] when the commit fails or the wait for
    /// it expires twice.
    pub async fn send(&self, event: &Event) -> Result<()> {
        // Registered before the flag check so shutdown either sees this
        // submission or this call sees the flag
        let guard = InFlight::enter(&self.commits);
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(SpoolError::QueueUnavailable);
        }

        let key = event
            .guid()
            .ok_or_else(|| SpoolError::Config("event has no guid header".into()))?
            .as_bytes()
            .to_vec();
        let frame = codec::encode(event)?;
        let value = self.cipher.encrypt(&frame)?;

        let store = self.store.clone();
        let wake = self.wake.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let start = Instant::now();
            store
                .put(&key, &value)
                .map_err(|e| SpoolError::DeliveryQueue(e.to_string()))?;
            observe::record_enqueue(start.elapsed(), value.len());
            wake.notify(Wake::Committed);
            Ok::<(), SpoolError>(())
        });

        for attempt in 1..=COMMIT_WAIT_ATTEMPTS {
            match tokio::time::timeout(self.commit_wait, &mut handle).await {
                Ok(Ok(result)) => return result,
                Ok(Err(e)) => {
                    return Err(SpoolError::DeliveryQueue(format!("commit task failed: {}", e)))
                }
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        wait_ms = self.commit_wait.as_millis() as u64,
                        "Interrupted while waiting for event commit"
                    );
                }
            }
        }

        Err(SpoolError::DeliveryQueue("gave up waiting for event commit".into()))
    }

    /// Number of submitted commits still running
    pub fn in_flight(&self) -> usize {
        self.commits.running.load(Ordering::SeqCst)
    }

    /// Wait until no commit is running, up to `timeout`
    ///
    /// Returns false if commits were still running at the deadline.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.commits.idle.notified();
                tokio::pin!(notified);
                // Registered before the check so a release in between is seen
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spool_core::{Headers, LockedPass, QueueEntry, StoreConfig, StoreStats, Visit};

    /// In-memory store with an optional slow put
    #[derive(Default)]
    struct MemStore {
        entries: Mutex<Vec<QueueEntry>>,
        put_delay: Duration,
        fail_puts: bool,
    }

    impl QueueStore for MemStore {
        fn open(_cfg: StoreConfig) -> Result<Self> {
            Ok(Self::default())
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
            std::thread::sleep(self.put_delay);
            if self.fail_puts {
                return Err(SpoolError::Transaction("disk full".into()));
            }
            self.entries
                .lock()
                .push(QueueEntry::new(key.to_vec(), value.to_vec()));
            Ok(())
        }

        fn scan(&self, limit: usize) -> Result<Vec<QueueEntry>> {
            Ok(self.entries.lock().iter().take(limit).cloned().collect())
        }

        fn delete_many(&self, _keys: &[Vec<u8>]) -> Result<usize> {
            Ok(0)
        }

        fn drain_locked(
            &self,
            _visit: &mut dyn FnMut(&[u8], &[u8]) -> Visit,
        ) -> Result<LockedPass> {
            Ok(LockedPass::default())
        }

        fn count(&self) -> usize {
            self.entries.lock().len()
        }

        fn stats(&self) -> StoreStats {
            StoreStats::default()
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    type Fixture = (
        Enqueuer<MemStore>,
        Arc<MemStore>,
        Arc<WakeQueue>,
        Arc<AtomicBool>,
    );

    fn enqueuer(store: MemStore, commit_wait: Duration) -> Fixture {
        let store = Arc::new(store);
        let wake = Arc::new(WakeQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let enqueuer = Enqueuer::new(
            store.clone(),
            PayloadCipher::plaintext(),
            wake.clone(),
            shutdown.clone(),
            commit_wait,
        );
        (enqueuer, store, wake, shutdown)
    }

    #[tokio::test]
    async fn test_send_commits_and_notifies() {
        let (enqueuer, store, wake, _) = enqueuer(MemStore::default(), Duration::from_secs(5));
        let event = Event::new(b"hello".to_vec());

        enqueuer.send(&event).await.unwrap();

        let entries = store.scan(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, event.guid().unwrap().as_bytes());
        assert_eq!(entries[0].value, codec::encode(&event).unwrap());
        assert_eq!(wake.len(), 1);
        assert_eq!(enqueuer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_send_after_shutdown() {
        let (enqueuer, store, _, shutdown) = enqueuer(MemStore::default(), Duration::from_secs(5));
        shutdown.store(true, Ordering::SeqCst);

        let result = enqueuer.send(&Event::new(b"late".to_vec())).await;
        assert!(matches!(result, Err(SpoolError::QueueUnavailable)));
        assert_eq!(store.count(), 0);
        assert_eq!(enqueuer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_send_requires_guid() {
        let (enqueuer, _, _, _) = enqueuer(MemStore::default(), Duration::from_secs(5));
        let event = Event::from_parts(b"anonymous".to_vec(), Headers::new());

        let result = enqueuer.send(&event).await;
        assert!(matches!(result, Err(SpoolError::Config(_))));
    }

    #[tokio::test]
    async fn test_put_failure_is_delivery_queue_error() {
        let store = MemStore {
            fail_puts: true,
            ..Default::default()
        };
        let (enqueuer, _, wake, _) = enqueuer(store, Duration::from_secs(5));

        let result = enqueuer.send(&Event::new(b"x".to_vec())).await;
        assert!(matches!(result, Err(SpoolError::DeliveryQueue(_))));
        assert!(wake.is_empty());
    }

    #[tokio::test]
    async fn test_slow_commit_survives_one_interrupted_wait() {
        let store = MemStore {
            put_delay: Duration::from_millis(200),
            ..Default::default()
        };
        let (enqueuer, store, _, _) = enqueuer(store, Duration::from_millis(150));

        enqueuer.send(&Event::new(b"slow".to_vec())).await.unwrap();
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_second_interrupted_wait_fails_but_commit_lands() {
        let store = MemStore {
            put_delay: Duration::from_millis(300),
            ..Default::default()
        };
        let (enqueuer, store, _, _) = enqueuer(store, Duration::from_millis(50));

        let result = enqueuer.send(&Event::new(b"slower".to_vec())).await;
        assert!(matches!(result, Err(SpoolError::DeliveryQueue(_))));

        // The commit was not abandoned
        assert!(enqueuer.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_when_last_commit_finishes() {
        let store = MemStore {
            put_delay: Duration::from_millis(300),
            ..Default::default()
        };
        let (enqueuer, store, _, _) = enqueuer(store, Duration::from_secs(5));
        let event = Event::new(b"pending".to_vec());

        let check = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let early = enqueuer.wait_idle(Duration::from_millis(50)).await;
            let late = enqueuer.wait_idle(Duration::from_secs(5)).await;
            (early, late)
        };
        let (sent, (early, late)) = tokio::join!(enqueuer.send(&event), check);

        sent.unwrap();
        assert!(!early);
        assert!(late);
        assert_eq!(enqueuer.in_flight(), 0);
        assert_eq!(store.count(), 1);
    }
}
