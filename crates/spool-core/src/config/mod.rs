pub mod spool;
pub mod store;

pub use spool::SpoolConfig;
pub use store::{StoreConfig, SyncMode};
