use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Which of the daemon's listeners an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    Control,
    LogRelay,
}

impl std::fmt::Display for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listener::Control => write!(f, "control"),
            Listener::LogRelay => write!(f, "log relay"),
        }
    }
}

/// Startup and lifecycle errors surfaced to the process entry point
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: Listener,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics sink already assigned")]
    SinkAlreadyAssigned,

    #[error("Log relay already started on {addr}")]
    LogRelayAlreadyStarted { addr: SocketAddr },

    #[error("Invalid advertised log relay URL {url}: {source}")]
    InvalidAdvertisedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request failures, each mapped to an HTTP status by the handlers
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("metrics sink not ready")]
    SinkUnavailable,

    #[error("daemon shutting down")]
    ShuttingDown,

    #[error("flush failed: {reason}")]
    FlushFailed { reason: String },

    #[error("failed to read request body: {reason}")]
    BodyRead { reason: String },

    #[error("request body not received within {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("log relay backlogged for {timeout:?}, payload dropped")]
    RelayBackpressureTimeout { timeout: Duration },

    #[error("log relay closed")]
    RelayClosed,

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("method {method} not allowed, logs must be POSTed")]
    MethodNotAllowed { method: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_formatting() {
        let error = DaemonError::Bind {
            listener: Listener::Control,
            addr: "127.0.0.1:8124".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };

        let msg = error.to_string();
        assert!(msg.contains("control listener"));
        assert!(msg.contains("127.0.0.1:8124"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn test_request_error_formatting() {
        assert_eq!(
            RequestError::SinkUnavailable.to_string(),
            "metrics sink not ready"
        );

        let error = RequestError::RelayBackpressureTimeout {
            timeout: Duration::from_secs(10),
        };
        assert!(error.to_string().contains("10s"));

        let error = RequestError::ReadTimeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            error.to_string(),
            "request body not received within 250ms"
        );
    }
}
