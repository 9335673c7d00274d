//! Push-based metrics reporter
//!
//! The default metrics sink of the daemon. Every flush snapshots the daemon
//! metrics and writes them as one structured JSON line, prefixed so log
//! pipelines can filter it out of ordinary output.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::domain::ports::MetricsSink;
use crate::infrastructure::observability::metrics::DaemonMetrics;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const METRICS_LINE_PREFIX: &str = "METRICS_JSON:";

/// Metrics snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub sequence: u64,
    pub readiness_gate_open: bool,
    pub synchronous_flushes: u64,
    pub log_payloads_total: u64,
    pub log_payload_bytes_total: u64,
    pub exposition: String,
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON lines on demand and on an interval.
#[derive(Clone)]
pub struct MetricsReporter {
    metrics: DaemonMetrics,
    writer: SharedWriter,
    start_time: Instant,
    sequence: Arc<AtomicU64>,
}

impl MetricsReporter {
    /// Create a reporter that writes to stdout
    pub fn new(metrics: DaemonMetrics) -> Self {
        Self::with_writer(metrics, Box::new(std::io::stdout()))
    }

    pub fn with_writer(metrics: DaemonMetrics, writer: Box<dyn Write + Send>) -> Self {
        Self {
            metrics,
            writer: Arc::new(Mutex::new(writer)),
            start_time: Instant::now(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of snapshots written so far
    pub fn flush_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Run periodic background flushes until `shutdown` fires, then flush
    /// one last time synchronously.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.flush(false).await {
                        warn!("MetricsReporter: periodic flush failed: {}", e);
                    }
                }
            }
        }

        if let Err(e) = self.flush(true).await {
            warn!("MetricsReporter: final flush failed: {}", e);
        }
        info!("MetricsReporter: stopped after {} flush(es)", self.flush_count());
    }

    fn collect_snapshot(&self, sequence: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            sequence,
            readiness_gate_open: self.metrics.readiness_gate_open.get() == 1,
            synchronous_flushes: self.metrics.flush_duration_seconds.get_sample_count(),
            log_payloads_total: self.metrics.log_payloads_total.get(),
            log_payload_bytes_total: self.metrics.log_payload_bytes_total.get(),
            exposition: self.metrics.encode_text(),
        }
    }

    fn write_snapshot(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("metrics writer lock poisoned"))?;

        // Sequence is taken under the lock so lines come out in order.
        let sequence = self.sequence.load(Ordering::SeqCst) + 1;
        let snapshot = self.collect_snapshot(sequence);
        let json = serde_json::to_string(&snapshot).context("Failed to serialize metrics")?;

        writeln!(writer, "{}{}", METRICS_LINE_PREFIX, json).context("Failed to write metrics")?;
        writer.flush().context("Failed to flush metrics writer")?;
        self.sequence.store(sequence, Ordering::SeqCst);

        debug!("MetricsReporter: wrote snapshot #{}", sequence);
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for MetricsReporter {
    async fn flush(&self, synchronous: bool) -> Result<()> {
        // The writer is blocking I/O (stdout may be a slow pipe), keep it off
        // the runtime workers.
        let reporter = self.clone();
        let write = tokio::task::spawn_blocking(move || reporter.write_snapshot());

        if synchronous {
            return write.await.context("Metrics write task failed")?;
        }

        tokio::spawn(async move {
            match write.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("MetricsReporter: background flush failed: {}", e),
                Err(e) => warn!("MetricsReporter: background flush task failed: {}", e),
            }
        });
        Ok(())
    }
}
