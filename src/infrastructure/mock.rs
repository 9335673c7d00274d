use crate::domain::ports::MetricsSink;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

/// A completed flush as observed by the mock
#[derive(Debug, Clone, Copy)]
pub struct FlushRecord {
    pub synchronous: bool,
    pub started_at: Instant,
    pub completed_at: Instant,
}

/// Metrics sink that records every flush, optionally slowly or failing.
#[derive(Clone)]
pub struct MockMetricsSink {
    flush_delay: Duration,
    fail: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    records: Arc<RwLock<Vec<FlushRecord>>>,
}

impl MockMetricsSink {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(flush_delay: Duration) -> Self {
        Self {
            flush_delay,
            fail: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Make subsequent flushes fail (after their delay).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn records(&self) -> Vec<FlushRecord> {
        self.records.read().await.clone()
    }

    pub async fn flush_count(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for MockMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a flush as in flight until dropped, even if the flush future is
/// cancelled mid-delay.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricsSink for MockMetricsSink {
    async fn flush(&self, synchronous: bool) -> Result<()> {
        let started_at = Instant::now();
        let guard = InFlightGuard::enter(&self.in_flight);

        if !self.flush_delay.is_zero() {
            tokio::time::sleep(self.flush_delay).await;
        }

        drop(guard);
        if self.fail.load(Ordering::SeqCst) {
            bail!("Mock sink configured to fail");
        }

        self.records.write().await.push(FlushRecord {
            synchronous,
            started_at,
            completed_at: Instant::now(),
        });
        info!("MockMetricsSink: flush complete (synchronous={})", synchronous);
        Ok(())
    }
}
