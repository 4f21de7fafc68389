use crate::error::Result;
use crate::types::{Batch, Event};

/// Remote delivery target consuming forwarded events
///
/// The sink owns its connection, retry and failover policy; the forwarder
/// only cares whether a call succeeded. A successful return means the
/// events were accepted and may be removed from the queue. Sinks must
/// tolerate duplicates: after a crash or an aborted pass the same event
/// can be delivered again.
///
/// Calls are made from the forwarder's dedicated thread and may block.
pub trait Sink: Send + Sync {
    /// Descriptions of the remote targets (e.g. `host:port`)
    ///
    /// A sink without targets is rejected when the spool is built.
    fn targets(&self) -> Vec<String>;

    /// Deliver a single event
    fn deliver(&self, event: &Event) -> Result<()>;

    /// Deliver a batch as one unit
    ///
    /// Default implementation delivers the events one by one and fails on
    /// the first error.
    fn deliver_batch(&self, batch: &Batch) -> Result<()> {
        for event in batch {
            self.deliver(event)?;
        }
        Ok(())
    }
}
