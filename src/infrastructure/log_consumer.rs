use crate::domain::types::LogPayload;
use futures::{Stream, StreamExt};
use tracing::{debug, info};

/// Drains relayed platform log payloads and re-emits their lines as tracing
/// events. Parsing and long-term forwarding happen elsewhere.
pub struct PlatformLogConsumer {
    lines_emitted: u64,
}

impl PlatformLogConsumer {
    pub fn new() -> Self {
        Self { lines_emitted: 0 }
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines_emitted
    }

    /// Consume until the stream closes. Returns the number of payloads seen.
    pub async fn run<S>(&mut self, mut stream: S) -> u64
    where
        S: Stream<Item = LogPayload> + Unpin,
    {
        info!("PlatformLogConsumer: started");
        let mut payloads = 0u64;

        while let Some(payload) = stream.next().await {
            payloads += 1;
            self.handle(&payload);
        }

        info!(
            "PlatformLogConsumer: relay closed after {} payload(s), {} line(s)",
            payloads, self.lines_emitted
        );
        payloads
    }

    fn handle(&mut self, payload: &LogPayload) {
        debug!("PlatformLogConsumer: payload of {} bytes", payload.len());

        let text = String::from_utf8_lossy(payload.as_bytes());
        for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            self.lines_emitted += 1;
            info!(target: "platform_logs", "{}", line);
        }
    }
}

impl Default for PlatformLogConsumer {
    fn default() -> Self {
        Self::new()
    }
}
