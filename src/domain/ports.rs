use anyhow::Result;
use async_trait::async_trait;

/// The metrics subsystem the daemon flushes on behalf of the runtime.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Flush buffered metrics.
    ///
    /// With `synchronous == true` the returned future must not resolve until
    /// the buffered data has been fully handed off. With `false` the sink may
    /// schedule the work and return early.
    async fn flush(&self, synchronous: bool) -> Result<()>;
}
