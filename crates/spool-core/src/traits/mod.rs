pub mod key_provider;
pub mod sink;
pub mod store;

pub use key_provider::KeyProvider;
pub use sink::Sink;
pub use store::{QueueStore, Visit};
