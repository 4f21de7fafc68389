pub mod entry;
pub mod event;
pub mod key;

pub use entry::{LockedPass, QueueEntry, StoreStats};
pub use event::{Batch, Event, Headers, GUID_HEADER};
pub use key::{SecretKey, KEY_SIZE};
