//! Spool lifecycle: startup, producer entry point, shutdown

use crate::cipher::PayloadCipher;
use crate::enqueue::Enqueuer;
use crate::forwarder::{Forwarder, ForwarderHandle};
use crate::key_provider::KeyProviderRegistry;
use crate::notification::WakeQueue;
use parking_lot::Mutex;
use spool_core::{Event, QueueStore, Result, Sink, SpoolConfig, SpoolError, StoreStats};
use spool_lmdb::LmdbQueueStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Durable forwarding queue in front of a sink
///
/// Producers call [`send`](Self::send), which returns once the event is
/// committed to the local store. A background forwarder delivers queued
/// events to the sink and removes them only after the sink accepts them.
///
/// # Example
///
/// ```ignore
/// let spool = Spool::open(config, Arc::new(my_sink), &KeyProviderRegistry::new())?;
/// spool.send(&Event::new(b"payload".to_vec())).await?;
/// spool.shutdown().await?;
/// ```
pub struct Spool<S: QueueStore = LmdbQueueStore> {
    name: String,
    store: Arc<S>,
    enqueuer: Enqueuer<S>,
    wake: Arc<WakeQueue>,
    shutdown: Arc<AtomicBool>,
    forwarder: Mutex<Option<ForwarderHandle>>,
    closed: AtomicBool,
    encrypted: bool,
    batch_size: usize,
    shutdown_timeout: Duration,
}

impl Spool<LmdbQueueStore> {
    /// Open an LMDB-backed spool and start forwarding
    pub fn open(
        config: SpoolConfig,
        sink: Arc<dyn Sink>,
        keys: &KeyProviderRegistry,
    ) -> Result<Self> {
        Self::open_with(config, sink, keys)
    }
}

impl<S: QueueStore> Spool<S> {
    /// Open a spool on any queue store backend and start forwarding
    ///
    /// Fails with [`SpoolError::Config`] when the sink has no targets and
    /// with [`SpoolError::StoreOpen`] when the store cannot be opened. A
    /// missing or failing key provider only disables encryption.
    pub fn open_with(
        config: SpoolConfig,
        sink: Arc<dyn Sink>,
        keys: &KeyProviderRegistry,
    ) -> Result<Self> {
        let targets = sink.targets();
        if targets.is_empty() {
            return Err(SpoolError::Config("no sink targets configured".into()));
        }

        let data_dir = config.store.data_dir();
        let name = spool_name(&targets, &data_dir);
        let batch_size = config.effective_batch_size();
        if config.batch_size != batch_size as i64 {
            tracing::warn!(
                configured = config.batch_size,
                batch_size,
                "Invalid batch size, using 1"
            );
        }

        let store = S::open(config.store.clone()).map_err(|e| match e {
            SpoolError::StoreOpen(_) => e,
            other => SpoolError::StoreOpen(other.to_string()),
        })?;
        let store = Arc::new(store);

        let key = keys.resolve(config.key_provider.as_deref());
        let cipher = PayloadCipher::new(key);
        let encrypted = cipher.is_enabled();

        let wake = Arc::new(WakeQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let enqueuer = Enqueuer::new(
            store.clone(),
            cipher.clone(),
            wake.clone(),
            shutdown.clone(),
            config.commit_wait(),
        );
        let forwarder = Forwarder::new(
            name.clone(),
            store.clone(),
            sink,
            cipher,
            wake.clone(),
            shutdown.clone(),
            batch_size,
            config.delay(),
        )
        .spawn()?;

        tracing::info!(
            name = %name,
            batch_size,
            delay_ms = config.delay_ms,
            encrypted,
            pending = store.count(),
            "Spool started"
        );

        Ok(Self {
            name,
            store,
            enqueuer,
            wake,
            shutdown,
            forwarder: Mutex::new(Some(forwarder)),
            closed: AtomicBool::new(false),
            encrypted,
            batch_size,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Durably queue an event for forwarding
    ///
    /// The event's `guid` header becomes its store key. Returns once the
    /// entry is committed.
    pub async fn send(&self, event: &Event) -> Result<()> {
        self.enqueuer.send(event).await
    }

    /// Approximate number of queued, undelivered events
    pub fn pending(&self) -> usize {
        self.store.count()
    }

    /// Whether the spool has stopped accepting events
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Stop accepting events, drain, and close the store
    ///
    /// Waits up to the configured shutdown timeout for in-flight commits
    /// and again for the forwarder to finish its pass. Closing the store is
    /// best-effort. Calling this more than once is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(name = %self.name, "Spool already shut down");
            return Ok(());
        }

        tracing::info!(name = %self.name, "Shutting down spool");
        self.signal_shutdown();

        if !self.enqueuer.wait_idle(self.shutdown_timeout).await {
            tracing::warn!(
                in_flight = self.enqueuer.in_flight(),
                "Timed out waiting for event commits"
            );
        }

        let handle = self.forwarder.lock().take();
        if let Some(mut handle) = handle {
            handle.join(self.shutdown_timeout).await;
        }

        let stats = self.store.stats();
        tracing::debug!(
            entries = stats.entries,
            puts = stats.puts,
            deletes = stats.deletes,
            failed_commits = stats.failed_commits,
            "Queue store statistics"
        );

        if let Err(e) = self.store.close() {
            tracing::warn!(error = %e, "Unable to cleanly close queue store");
        }

        tracing::info!(name = %self.name, pending = stats.entries, "Spool shut down");
        Ok(())
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_shutdown();
    }
}

impl<S: QueueStore> Drop for Spool<S> {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        // Not shut down: stop the forwarder but leave the store unsynced
        self.signal_shutdown();
        if let Some(mut handle) = self.forwarder.lock().take() {
            handle.join_blocking(self.shutdown_timeout);
        }
    }
}

/// Descriptive name built from the sink targets and the data directory
pub fn spool_name(targets: &[String], data_dir: &Path) -> String {
    format!("Spool[{}] {}", targets.join(","), data_dir.display())
}
