pub mod list;
pub mod status;

use anyhow::{bail, Context, Result};
use spool::{LmdbQueueStore, QueueStore, StoreConfig};
use std::path::PathBuf;

/// Store location selected on the command line
pub struct StoreTarget {
    pub path: PathBuf,
    pub name: String,
}

impl StoreTarget {
    /// Open an existing store; never creates one
    pub fn open(&self) -> Result<LmdbQueueStore> {
        if !self.path.join("data.mdb").exists() {
            bail!("No spool store found at {}", self.path.display());
        }

        let config = StoreConfig::new(&self.path).with_name(&self.name);
        LmdbQueueStore::open(config)
            .with_context(|| format!("Failed to open store at {}", self.path.display()))
    }
}
