//! Push-based observability for the daemon
//!
//! Metrics are only pushed out as structured JSON lines. There is no scrape
//! endpoint; the control surface is the only inbound HTTP API.

pub mod metrics;
pub mod reporter;

pub use metrics::DaemonMetrics;
pub use reporter::MetricsReporter;
