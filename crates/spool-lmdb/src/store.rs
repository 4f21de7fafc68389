use lmdb::{Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags};
use spool_core::{
    config::SyncMode,
    error::{Result, SpoolError},
    traits::{QueueStore, Visit},
    types::{LockedPass, QueueEntry, StoreStats},
    StoreConfig,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

fn txn_err(e: lmdb::Error) -> SpoolError {
    SpoolError::Transaction(e.to_string())
}

/// LMDB-backed queue store
///
/// Entries live in a single named database keyed by event GUID bytes.
/// Every mutation is its own LMDB write transaction; LMDB's writer mutex
/// serializes concurrent producers and the forwarder.
pub struct LmdbQueueStore {
    env: Arc<Environment>,
    db: Database,
    path: PathBuf,
    entries: AtomicUsize,
    puts: AtomicU64,
    deletes: AtomicU64,
    failed_commits: AtomicU64,
    closed: AtomicBool,
}

impl LmdbQueueStore {
    /// Directory holding the LMDB data and lock files
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SpoolError::Transaction("Store is closed".into()));
        }
        Ok(())
    }

    /// Count entries with a full cursor walk (used once at open)
    fn count_entries(env: &Environment, db: Database) -> Result<usize> {
        let txn = env.begin_ro_txn().map_err(txn_err)?;
        let count = {
            let mut cursor = txn.open_ro_cursor(db).map_err(txn_err)?;
            cursor.iter().count()
        };
        txn.abort();
        Ok(count)
    }

    fn release(&self, removed: usize) {
        if removed == 0 {
            return;
        }
        let _ = self
            .entries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(removed))
            });
        self.deletes.fetch_add(removed as u64, Ordering::SeqCst);
    }
}

impl QueueStore for LmdbQueueStore {
    fn open(cfg: StoreConfig) -> Result<Self> {
        let path = cfg.data_dir();

        // Create directory if it doesn't exist
        std::fs::create_dir_all(&path).map_err(|e| {
            SpoolError::StoreOpen(format!("Failed to create {}: {}", path.display(), e))
        })?;

        let mut env_builder = Environment::new();
        env_builder.set_max_dbs(1);
        env_builder.set_map_size(cfg.map_size);
        env_builder.set_max_readers(cfg.max_readers);

        let mut flags = EnvironmentFlags::empty();
        match cfg.sync_mode {
            SyncMode::Full => {}
            SyncMode::NoMetaSync => {
                flags.insert(EnvironmentFlags::NO_META_SYNC);
            }
            SyncMode::NoSync => {
                flags.insert(EnvironmentFlags::NO_SYNC);
            }
        }
        env_builder.set_flags(flags);

        let env = env_builder.open(&path).map_err(|e| {
            SpoolError::StoreOpen(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let db = env
            .create_db(Some(&cfg.name), DatabaseFlags::empty())
            .map_err(|e| SpoolError::StoreOpen(format!("Failed to open '{}': {}", cfg.name, e)))?;

        let entries = Self::count_entries(&env, db)?;
        tracing::debug!(
            path = %path.display(),
            database = %cfg.name,
            entries,
            "Queue store opened"
        );

        Ok(Self {
            env: Arc::new(env),
            db,
            path,
            entries: AtomicUsize::new(entries),
            puts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            failed_commits: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let mut txn = self.env.begin_rw_txn().map_err(txn_err)?;
        let existed = match txn.get(self.db, &key) {
            Ok(_) => true,
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(txn_err(e)),
        };
        txn.put(self.db, &key, &value, WriteFlags::empty())
            .map_err(txn_err)?;

        // Counted before the commit; the counter never drops below the committed size
        if !existed {
            self.entries.fetch_add(1, Ordering::SeqCst);
        }
        if let Err(e) = txn.commit() {
            if !existed {
                self.entries.fetch_sub(1, Ordering::SeqCst);
            }
            self.failed_commits.fetch_add(1, Ordering::SeqCst);
            return Err(txn_err(e));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn scan(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        self.ensure_open()?;

        let txn = self.env.begin_ro_txn().map_err(txn_err)?;
        let mut entries = Vec::with_capacity(limit.min(1024));
        {
            let mut cursor = txn.open_ro_cursor(self.db).map_err(txn_err)?;
            for (key, value) in cursor.iter().take(limit) {
                entries.push(QueueEntry::new(key.to_vec(), value.to_vec()));
            }
        }
        txn.abort();

        Ok(entries)
    }

    fn delete_many(&self, keys: &[Vec<u8>]) -> Result<usize> {
        self.ensure_open()?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut txn = self.env.begin_rw_txn().map_err(txn_err)?;
        let mut removed = 0;
        for key in keys {
            match txn.del(self.db, key, None) {
                Ok(()) => removed += 1,
                Err(lmdb::Error::NotFound) => {}
                Err(e) => {
                    tracing::error!(
                        key = %String::from_utf8_lossy(key),
                        error = %e,
                        "Error deleting key from store"
                    );
                }
            }
        }

        if let Err(e) = txn.commit() {
            self.failed_commits.fetch_add(1, Ordering::SeqCst);
            return Err(txn_err(e));
        }

        self.release(removed);
        Ok(removed)
    }

    fn drain_locked(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> Visit) -> Result<LockedPass> {
        self.ensure_open()?;

        let mut txn = self.env.begin_rw_txn().map_err(txn_err)?;
        let mut pass = LockedPass::default();
        let mut aborted = false;
        {
            let mut cursor = txn.open_rw_cursor(self.db).map_err(txn_err)?;
            let mut iter = cursor.iter();
            while let Some((key, value)) = iter.next() {
                pass.visited += 1;
                match visit(key, value) {
                    Visit::Keep => {}
                    Visit::Delete => match cursor.del(WriteFlags::empty()) {
                        Ok(()) => pass.deleted += 1,
                        Err(e) => {
                            tracing::error!(error = %e, "Unable to delete entry");
                        }
                    },
                    Visit::Stop => break,
                    Visit::Abort => {
                        aborted = true;
                        break;
                    }
                }
            }
        }

        if aborted {
            txn.abort();
            return Ok(pass);
        }

        if let Err(e) = txn.commit() {
            self.failed_commits.fetch_add(1, Ordering::SeqCst);
            return Err(txn_err(e));
        }
        pass.committed = true;
        self.release(pass.deleted);
        Ok(pass)
    }

    fn count(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    fn resync(&self) -> Result<usize> {
        self.ensure_open()?;

        // The write lock keeps puts out, so no uncommitted put is counted
        let txn = self.env.begin_rw_txn().map_err(txn_err)?;
        let actual = {
            let mut cursor = txn.open_ro_cursor(self.db).map_err(txn_err)?;
            cursor.iter().count()
        };
        let previous = self.entries.swap(actual, Ordering::SeqCst);
        txn.abort();

        if previous != actual {
            tracing::debug!(previous, actual, "Queue count resynced");
        }
        Ok(actual)
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.entries.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            failed_commits: self.failed_commits.load(Ordering::SeqCst),
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // LMDB closes the environment when the last handle drops
        self.env.sync(true).map_err(txn_err)
    }
}
