//! Prometheus metrics definitions for the daemon
//!
//! All metrics use the `serverless_daemon_` prefix and live in a private
//! registry. They are only ever pushed out by the reporter, never scraped.

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics for the control and log relay surfaces
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: Arc<Registry>,
    /// Control requests by route and HTTP status
    pub control_requests_total: IntCounterVec,
    /// Time spent inside synchronous sink flushes
    pub flush_duration_seconds: Histogram,
    /// Time requests spent parked on the readiness gate
    pub readiness_wait_seconds: HistogramVec,
    /// Readiness gate status (0=closed, 1=open)
    pub readiness_gate_open: IntGauge,
    /// Log payloads handed to the relay channel
    pub log_payloads_total: IntCounter,
    /// Bytes handed to the relay channel
    pub log_payload_bytes_total: IntCounter,
    /// Log payloads refused, by reason
    pub log_relay_rejected_total: IntCounterVec,
}

impl DaemonMetrics {
    /// Create a new metrics instance with everything registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let control_requests_total = IntCounterVec::new(
            Opts::new(
                "serverless_daemon_control_requests_total",
                "Control requests by route and status",
            ),
            &["route", "status"],
        )?;
        registry.register(Box::new(control_requests_total.clone()))?;

        let flush_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "serverless_daemon_flush_duration_seconds",
                "Duration of synchronous metrics flushes in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(flush_duration_seconds.clone()))?;

        let readiness_wait_seconds = HistogramVec::new(
            HistogramOpts::new(
                "serverless_daemon_readiness_wait_seconds",
                "Time spent waiting on the readiness gate in seconds",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["route"],
        )?;
        registry.register(Box::new(readiness_wait_seconds.clone()))?;

        let readiness_gate_open = IntGauge::with_opts(Opts::new(
            "serverless_daemon_readiness_gate_open",
            "Readiness gate status (0=closed, 1=open)",
        ))?;
        registry.register(Box::new(readiness_gate_open.clone()))?;

        let log_payloads_total = IntCounter::with_opts(Opts::new(
            "serverless_daemon_log_payloads_total",
            "Log payloads relayed to the consumer",
        ))?;
        registry.register(Box::new(log_payloads_total.clone()))?;

        let log_payload_bytes_total = IntCounter::with_opts(Opts::new(
            "serverless_daemon_log_payload_bytes_total",
            "Log payload bytes relayed to the consumer",
        ))?;
        registry.register(Box::new(log_payload_bytes_total.clone()))?;

        let log_relay_rejected_total = IntCounterVec::new(
            Opts::new(
                "serverless_daemon_log_relay_rejected_total",
                "Log payloads refused by the relay, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(log_relay_rejected_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            control_requests_total,
            flush_duration_seconds,
            readiness_wait_seconds,
            readiness_gate_open,
            log_payloads_total,
            log_payload_bytes_total,
            log_relay_rejected_total,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn encode_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_control_request(&self, route: &str, status: u16) {
        self.control_requests_total
            .with_label_values(&[route, status.to_string().as_str()])
            .inc();
    }

    pub fn observe_readiness_wait(&self, route: &str, waited: Duration) {
        self.readiness_wait_seconds
            .with_label_values(&[route])
            .observe(waited.as_secs_f64());
    }

    pub fn observe_flush(&self, took: Duration) {
        self.flush_duration_seconds.observe(took.as_secs_f64());
    }

    pub fn record_payload(&self, bytes: usize) {
        self.log_payloads_total.inc();
        self.log_payload_bytes_total.inc_by(bytes as u64);
    }

    pub fn inc_rejected(&self, reason: &str) {
        self.log_relay_rejected_total
            .with_label_values(&[reason])
            .inc();
    }
}
