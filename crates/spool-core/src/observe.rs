//! Optional metrics instrumentation for spool.
//!
//! When the `observe` feature is enabled, key operations emit counters,
//! histograms, and gauges via the [`metrics`] crate. A downstream
//! application must install a metrics recorder (e.g. `metrics-exporter-prometheus`)
//! to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a committed enqueue (counter + latency histogram + payload size).
///
/// - `spool.enqueue.total`: incremented on every committed event
/// - `spool.enqueue.commit_duration_seconds`: histogram of commit latency
/// - `spool.enqueue.bytes_total`: stored payload bytes
#[inline]
pub fn record_enqueue(duration: std::time::Duration, bytes: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("spool.enqueue.total").increment(1);
        metrics::histogram!("spool.enqueue.commit_duration_seconds")
            .record(duration.as_secs_f64());
        metrics::counter!("spool.enqueue.bytes_total").increment(bytes as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, bytes);
    }
}

/// Record a forwarding pass.
///
/// - `spool.forward.passes_total`: counter with `outcome` label (`ok` / `fail`)
/// - `spool.forward.pass_duration_seconds`: histogram
/// - `spool.forward.events_delivered_total`: counter
#[inline]
pub fn record_pass(duration: std::time::Duration, delivered: u64, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("spool.forward.passes_total", "outcome" => outcome).increment(1);
        metrics::histogram!("spool.forward.pass_duration_seconds").record(duration.as_secs_f64());
        metrics::counter!("spool.forward.events_delivered_total").increment(delivered);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, delivered, success);
    }
}

/// Record entries dropped because they could not be decrypted or decoded.
///
/// - `spool.forward.events_dropped_total`: counter
#[inline]
pub fn record_dropped(count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("spool.forward.events_dropped_total").increment(count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}

/// Set the current queue depth gauge.
///
/// - `spool.queue.depth`: gauge
#[inline]
pub fn set_queue_depth(depth: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("spool.queue.depth").set(depth as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = depth;
    }
}
