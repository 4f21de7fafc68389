use super::StoreConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a spool: the store plus forwarding behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolConfig {
    /// Queue store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Number of events per delivery batch (default: 1)
    ///
    /// Values <= 0 are treated as 1. A batch size of 1 selects the
    /// single-event forwarding protocol.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Maximum time an event waits before a partial batch is forwarded,
    /// and the pause after a failed delivery, in milliseconds (default: 100)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Name of the key provider supplying the at-rest encryption key
    ///
    /// When unset, queued payloads are stored in plaintext.
    #[serde(default)]
    pub key_provider: Option<String>,

    /// How long a producer waits for its commit before the wait counts as
    /// interrupted, in milliseconds (default: 30000)
    ///
    /// The wait is retried once; the commit itself is never abandoned.
    #[serde(default = "default_commit_wait_ms")]
    pub commit_wait_ms: u64,

    /// Bound on each shutdown phase (draining producers, joining the
    /// forwarder), in milliseconds (default: 60000)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_batch_size() -> i64 {
    1
}

fn default_delay_ms() -> u64 {
    100
}

fn default_commit_wait_ms() -> u64 {
    30_000
}

fn default_shutdown_timeout_ms() -> u64 {
    60_000
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl SpoolConfig {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            batch_size: default_batch_size(),
            delay_ms: default_delay_ms(),
            key_provider: None,
            commit_wait_ms: default_commit_wait_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    /// Resolve the encryption key through the named provider
    pub fn with_key_provider(mut self, name: impl Into<String>) -> Self {
        self.key_provider = Some(name.into());
        self
    }

    pub fn with_commit_wait(mut self, wait: Duration) -> Self {
        self.commit_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Batch size with non-positive values coerced to 1
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size <= 0 {
            1
        } else {
            self.batch_size as usize
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn commit_wait(&self) -> Duration {
        Duration::from_millis(self.commit_wait_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
