use crate::domain::errors::DaemonError;
use crate::domain::ports::MetricsSink;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Write-once slot for the metrics sink.
///
/// Empty until the initialization sequence assigns it; once assigned it is
/// never replaced or cleared. `OnceLock` publishes the value with release
/// semantics, so every reader that observes it sees the fully built sink.
#[derive(Default)]
pub struct MetricsSinkHandle {
    sink: OnceLock<Arc<dyn MetricsSink>>,
}

impl MetricsSinkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, sink: Arc<dyn MetricsSink>) -> Result<(), DaemonError> {
        self.sink
            .set(sink)
            .map_err(|_| DaemonError::SinkAlreadyAssigned)?;
        info!("MetricsSinkHandle: metrics sink assigned");
        Ok(())
    }

    pub fn get(&self) -> Option<Arc<dyn MetricsSink>> {
        self.sink.get().cloned()
    }

    pub fn is_assigned(&self) -> bool {
        self.sink.get().is_some()
    }
}

impl std::fmt::Debug for MetricsSinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSinkHandle")
            .field("assigned", &self.is_assigned())
            .finish()
    }
}
