//! Metrics sink abstraction, injected into the API and worker constructors
//! instead of a shared global `statsd` client.

/// Counters and timings emitted by the admission surface and the worker.
/// Mirrors the shape of the original `statsd.Client` calls (`Count`,
/// `Timing`) without committing callers to one wire protocol.
pub trait Metrics: Send + Sync {
    fn incr_counter(&self, name: &str, tags: &[&str]);
    fn record_timing(&self, name: &str, duration_ms: u64, tags: &[&str]);
}

/// Discards everything. The default when no metrics sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn incr_counter(&self, _name: &str, _tags: &[&str]) {}
    fn record_timing(&self, _name: &str, _duration_ms: u64, _tags: &[&str]) {}
}

/// Logs counters and timings as `tracing` events. Useful in environments
/// without a real metrics sink wired up, and in tests that want to assert
/// something was recorded without a network dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn incr_counter(&self, name: &str, tags: &[&str]) {
        tracing::debug!(metric = name, tags = ?tags, "counter incremented");
    }

    fn record_timing(&self, name: &str, duration_ms: u64, tags: &[&str]) {
        tracing::debug!(metric = name, duration_ms, tags = ?tags, "timing recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_does_not_panic() {
        let m = NoopMetrics;
        m.incr_counter("vault.create", &[]);
        m.record_timing("worker.vault.create.latency", 42, &["queue:main"]);
    }

    #[test]
    fn tracing_metrics_does_not_panic() {
        let m = TracingMetrics;
        m.incr_counter("vault.create", &["path:/vault/create"]);
        m.record_timing("worker.vault.sign.latency", 17, &[]);
    }
}
