use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

pub mod shutdown_service;

use crate::application::control::{ControlServer, ControlState};
use crate::application::log_relay::{LogRelayServer, LogStream};
use crate::application::server::ServerHandle;
use crate::application::system::shutdown_service::ShutdownCoordinator;
use crate::config::{Config, LogRelayEnvConfig};
use crate::domain::errors::DaemonError;
use crate::domain::ports::MetricsSink;
use crate::domain::readiness::ReadinessGate;
use crate::domain::sink_handle::MetricsSinkHandle;
use crate::domain::types::DaemonPhase;
use crate::infrastructure::observability::DaemonMetrics;

/// Cloneable handle for the initialization sequence: assign the sink, then
/// open the gate.
#[derive(Clone)]
pub struct ReadinessController {
    gate: Arc<ReadinessGate>,
    sink: Arc<MetricsSinkHandle>,
    metrics: DaemonMetrics,
}

impl ReadinessController {
    pub fn assign_sink(&self, sink: Arc<dyn MetricsSink>) -> Result<(), DaemonError> {
        self.sink.assign(sink)
    }

    /// Open the readiness gate. The sink must already be assigned for flush
    /// requests to succeed; opening without one is tolerated but flagged.
    pub fn open(&self) {
        if !self.sink.is_assigned() {
            warn!("ReadinessController: opening the gate before a metrics sink was assigned");
        }
        if self.gate.open() {
            self.metrics.readiness_gate_open.set(1);
        }
    }

    /// `assign_sink` followed by `open`, in that order.
    pub fn mark_metrics_ready(&self, sink: Arc<dyn MetricsSink>) -> Result<(), DaemonError> {
        self.assign_sink(sink)?;
        self.open();
        Ok(())
    }
}

/// The control-plane daemon: control server, optional log relay, and the
/// readiness state they share.
pub struct Daemon {
    readiness: ReadinessController,
    shutdown: ShutdownCoordinator,
    control_addr: SocketAddr,
    control: Option<ServerHandle>,
    log_relay: Option<ServerHandle>,
    stopped: bool,
}

impl Daemon {
    /// Bind and start the control server. The hello route is usable (and
    /// blocking) as soon as this returns; a bind failure aborts startup.
    pub async fn start(config: &Config, metrics: DaemonMetrics) -> Result<Self, DaemonError> {
        info!("Daemon: starting (phase {})", DaemonPhase::Starting);

        let gate = Arc::new(ReadinessGate::new());
        let sink = Arc::new(MetricsSinkHandle::new());
        let shutdown = ShutdownCoordinator::new();
        metrics.readiness_gate_open.set(0);

        let state = ControlState {
            gate: gate.clone(),
            sink: sink.clone(),
            metrics: metrics.clone(),
            shutdown: shutdown.token(),
        };
        let control = ControlServer::bind(config.control.socket_addr(), state)
            .await?
            .spawn()?;
        let control_addr = control.local_addr();

        let daemon = Self {
            readiness: ReadinessController {
                gate,
                sink,
                metrics,
            },
            shutdown,
            control_addr,
            control: Some(control),
            log_relay: None,
            stopped: false,
        };
        info!(
            "Daemon: control server up on {} (phase {})",
            control_addr,
            daemon.phase()
        );
        Ok(daemon)
    }

    /// Start the log ingestion listener. Returns the URL the platform should
    /// push logs to and the stream the consumer drains.
    pub async fn start_log_relay(
        &mut self,
        config: &LogRelayEnvConfig,
    ) -> Result<(Url, LogStream), DaemonError> {
        if let Some(existing) = &self.log_relay {
            return Err(DaemonError::LogRelayAlreadyStarted {
                addr: existing.local_addr(),
            });
        }

        let (url, stream, handle) = LogRelayServer::start(
            config,
            self.readiness.metrics.clone(),
            self.shutdown.token(),
        )
        .await?;
        self.log_relay = Some(handle);
        Ok((url, stream))
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn log_relay_addr(&self) -> Option<SocketAddr> {
        self.log_relay.as_ref().map(ServerHandle::local_addr)
    }

    pub fn readiness(&self) -> ReadinessController {
        self.readiness.clone()
    }

    pub fn assign_sink(&self, sink: Arc<dyn MetricsSink>) -> Result<(), DaemonError> {
        self.readiness.assign_sink(sink)
    }

    pub fn open_gate(&self) {
        self.readiness.open();
    }

    pub fn mark_metrics_ready(&self, sink: Arc<dyn MetricsSink>) -> Result<(), DaemonError> {
        self.readiness.mark_metrics_ready(sink)
    }

    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    pub fn phase(&self) -> DaemonPhase {
        if self.stopped {
            DaemonPhase::Stopped
        } else if self.shutdown.is_triggered() {
            DaemonPhase::ShuttingDown
        } else if self.readiness.gate.is_ready() {
            DaemonPhase::Ready
        } else if self.readiness.sink.is_assigned() {
            DaemonPhase::MetricsReady
        } else {
            DaemonPhase::ControlServerUp
        }
    }

    /// Stop both listeners. Requests parked on the readiness gate are
    /// released with 503 immediately; other in-flight requests get `grace`
    /// to finish before their server is aborted.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.stopped {
            return;
        }
        info!("Daemon: initiating graceful shutdown (grace {:?})", grace);
        self.shutdown.trigger();

        let control = self.control.take();
        let log_relay = self.log_relay.take();
        let (control_clean, relay_clean) = tokio::join!(
            async move {
                match control {
                    Some(handle) => handle.stop(grace).await,
                    None => true,
                }
            },
            async move {
                match log_relay {
                    Some(handle) => handle.stop(grace).await,
                    None => true,
                }
            },
        );

        self.stopped = true;
        info!(
            "Daemon: stopped (control clean: {}, log relay clean: {})",
            control_clean, relay_clean
        );
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        // Servers still running would otherwise outlive the daemon.
        if !self.stopped {
            self.shutdown.trigger();
        }
    }
}
