use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory used when no storage path is configured.
pub const DEFAULT_DATA_DIR: &str = ".spool/data";

/// Configuration for the queue store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the store directory (created if missing)
    ///
    /// An empty path falls back to [`DEFAULT_DATA_DIR`].
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Name of the database inside the store environment
    /// Default: "events"
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum map size for LMDB (in bytes)
    /// Default: 1GB
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Sync mode for durability
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Maximum number of readers (LMDB specific)
    /// Default: 126
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// `fsync()` after every commit (default).
    ///
    /// A producer is only told its event was accepted once the commit has
    /// reached stable storage, so this is the mode the queue's no-loss
    /// guarantee is stated against.
    #[default]
    Full,

    /// Skips syncing the LMDB meta-page on each commit.
    ///
    /// Data pages are still synced, so committed events survive process
    /// crashes. An OS crash or power failure _may_ lose the last commit.
    NoMetaSync,

    /// No `fsync()` at all; the OS page cache decides when to flush.
    ///
    /// **WARNING**: offers no durability beyond normal process lifetime.
    /// Only use this for tests or disposable queues.
    NoSync,
}

fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_name() -> String {
    "events".to_string()
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024 // 1GB
}

fn default_max_readers() -> u32 {
    126
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(default_path())
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: default_name(),
            map_size: default_map_size(),
            sync_mode: SyncMode::default(),
            max_readers: default_max_readers(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// The directory the store lives in, with the default applied.
    pub fn data_dir(&self) -> PathBuf {
        if self.path.as_os_str().is_empty() {
            default_path()
        } else {
            self.path.clone()
        }
    }
}
