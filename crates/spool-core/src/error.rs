use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid construction parameters, e.g. a sink without targets.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to open store: {0}")]
    StoreOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Key provider error: {0}")]
    KeyProvider(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The spool has been told to shut down and no longer records events.
    #[error("Unable to record event, queue is shut down")]
    QueueUnavailable,

    /// The event could not be durably committed to the queue.
    #[error("Delivery queue error: {0}")]
    DeliveryQueue(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SpoolError>;

impl SpoolError {
    /// Errors a forwarding pass can recover from by retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SpoolError::Delivery(_))
    }
}

// Sink implementations usually wrap their own client errors:
//
// impl From<MyClientError> for SpoolError {
//     fn from(err: MyClientError) -> Self {
//         SpoolError::Delivery(err.to_string())
//     }
// }
