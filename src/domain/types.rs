use bytes::Bytes;

/// One request body pushed by the platform log source, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    data: Bytes,
}

impl LogPayload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Position of the daemon in its lifecycle.
///
/// `Starting` is only observable while `Daemon::start` is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    Starting,
    ControlServerUp,
    MetricsReady,
    Ready,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for DaemonPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DaemonPhase::Starting => "starting",
            DaemonPhase::ControlServerUp => "control_server_up",
            DaemonPhase::MetricsReady => "metrics_ready",
            DaemonPhase::Ready => "ready",
            DaemonPhase::ShuttingDown => "shutting_down",
            DaemonPhase::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}
