//! Serverless Daemon - control plane for a function runtime
//!
//! Runs next to the runtime and exposes:
//! - `/lambda/hello` and `/lambda/flush` on the control listener
//! - a log ingestion listener the platform pushes logs to
//!
//! Metrics are pushed via structured JSON lines to stdout.
//!
//! # Usage
//! ```sh
//! CONTROL_PORT=8124 LOG_RELAY_PORT=8125 cargo run
//! ```
//!
//! # Environment Variables
//! - `CONTROL_BIND_ADDRESS` / `CONTROL_PORT` - control listener (default: 127.0.0.1:8124)
//! - `LOG_RELAY_ENABLED` - start the log listener (default: true)
//! - `LOG_RELAY_PORT` - log listener port (default: 8125)
//! - `OBSERVABILITY_INTERVAL` - seconds between background metric flushes (default: 60)
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serverless_daemon::application::system::Daemon;
use serverless_daemon::application::system::shutdown_service::wait_for_termination_signal;
use serverless_daemon::config::Config;
use serverless_daemon::infrastructure::PlatformLogConsumer;
use serverless_daemon::infrastructure::observability::{DaemonMetrics, MetricsReporter};
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(author, version, about = "Serverless control-plane daemon", long_about = None)]
struct Cli {
    /// Control listener port (overrides CONTROL_PORT)
    #[arg(long)]
    control_port: Option<u16>,

    /// Log relay listener port (overrides LOG_RELAY_PORT)
    #[arg(long)]
    log_port: Option<u16>,

    /// Do not start the log relay listener
    #[arg(long)]
    no_log_relay: bool,

    /// Log output format (overrides LOG_FORMAT)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.control_port {
            config.control.port = port;
        }
        if let Some(port) = self.log_port {
            config.log_relay.port = port;
        }
        if self.no_log_relay {
            config.log_relay.enabled = false;
        }
    }

    fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(|| {
            match std::env::var("LOG_FORMAT").map(|v| v.to_lowercase()) {
                Ok(v) if v == "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            }
        })
    }
}

fn init_logging(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_format());

    info!("Serverless Daemon {} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config);
    info!(
        "Configuration loaded: control={}, log_relay={}, grace={:?}",
        config.control.socket_addr(),
        if config.log_relay.enabled { "enabled" } else { "disabled" },
        config.shutdown_grace
    );

    let metrics = DaemonMetrics::new().context("Failed to create metrics")?;

    // The control listener is the daemon's whole contract: failing to bind it is fatal.
    let mut daemon = Daemon::start(&config, metrics.clone())
        .await
        .context("Failed to start control server")?;
    let shutdown = daemon.shutdown_coordinator();

    let consumer = if config.log_relay.enabled {
        match daemon.start_log_relay(&config.log_relay).await {
            Ok((url, stream)) => {
                info!("Platform logs should be sent to {}", url);
                Some(tokio::spawn(async move {
                    let mut consumer = PlatformLogConsumer::new();
                    consumer.run(stream).await
                }))
            }
            Err(e) => {
                error!("Log relay unavailable, continuing without log collection: {}", e);
                None
            }
        }
    } else {
        info!("Log relay disabled.");
        None
    };

    // Metrics come up after the control server so hello is reachable right away.
    let readiness = daemon.readiness();
    let init_delay = config.metrics_init_delay;
    let observability = config.observability.clone();
    let reporter_shutdown = shutdown.token();
    let init = tokio::spawn(async move {
        if !init_delay.is_zero() {
            tokio::time::sleep(init_delay).await;
        }

        let reporter = MetricsReporter::new(metrics);
        let background = if observability.enabled {
            info!(
                "Metrics reporter started (interval: {:?})",
                observability.interval
            );
            Some(tokio::spawn(
                reporter
                    .clone()
                    .run(observability.interval, reporter_shutdown),
            ))
        } else {
            info!("Periodic metrics reporting disabled.");
            None
        };

        if let Err(e) = readiness.mark_metrics_ready(Arc::new(reporter)) {
            error!("Failed to publish metrics sink: {}", e);
        }
        background
    });

    info!("Daemon running. Press Ctrl+C to shutdown.");
    tokio::select! {
        _ = wait_for_termination_signal() => {}
        _ = shutdown.wait() => {}
    }

    daemon.shutdown(config.shutdown_grace).await;

    if !init.is_finished() {
        warn!("Metrics initialization still pending at shutdown, abandoning it.");
        init.abort();
    } else if let Ok(Some(background)) = init.await {
        if tokio::time::timeout(config.shutdown_grace, background)
            .await
            .is_err()
        {
            warn!("Metrics reporter did not finish its final flush in time.");
        }
    }

    if let Some(consumer) = consumer {
        match tokio::time::timeout(config.shutdown_grace, consumer).await {
            Ok(Ok(payloads)) => info!("Log consumer drained {} payload(s).", payloads),
            Ok(Err(e)) => error!("Log consumer task failed: {}", e),
            Err(_) => warn!("Log consumer did not drain in time."),
        }
    }

    info!("Shutdown complete. Exiting...");
    Ok(())
}
