//! Control surface used by the function runtime.
//!
//! - `/lambda/hello` blocks until the daemon is ready, then answers 200. It
//!   gives the runtime a way to synchronise its own start with ours.
//! - `/lambda/flush` blocks until ready, then flushes the metrics sink
//!   synchronously. 503 if no sink has been assigned.
//!
//! Both routes answer 503 as soon as shutdown starts instead of waiting on a
//! gate that may never open.

use crate::application::server::{self, ServerHandle};
use crate::domain::errors::{DaemonError, Listener, RequestError};
use crate::domain::readiness::ReadinessGate;
use crate::domain::sink_handle::MetricsSinkHandle;
use crate::infrastructure::observability::DaemonMetrics;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub const HELLO_PATH: &str = "/lambda/hello";
pub const FLUSH_PATH: &str = "/lambda/flush";

/// Shared state handed to every control request
#[derive(Clone)]
pub struct ControlState {
    pub gate: Arc<ReadinessGate>,
    pub sink: Arc<MetricsSinkHandle>,
    pub metrics: DaemonMetrics,
    pub shutdown: CancellationToken,
}

impl ControlState {
    async fn wait_ready(&self, route: &str) -> Result<(), RequestError> {
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = self.gate.wait() => {}
            _ = self.shutdown.cancelled() => {
                debug!("ControlServer: releasing {} waiter, shutting down", route);
                return Err(RequestError::ShuttingDown);
            }
        }
        self.metrics.observe_readiness_wait(route, started.elapsed());
        Ok(())
    }

    fn record(&self, route: &str, result: Result<StatusCode, RequestError>) -> Response {
        let response = match result {
            Ok(status) => status.into_response(),
            Err(e) => e.into_response(),
        };
        self.metrics
            .inc_control_request(route, response.status().as_u16());
        response
    }
}

pub struct ControlServer {
    listener: TcpListener,
    state: ControlState,
}

impl ControlServer {
    /// Bind the control listener. Failure here is fatal to the daemon.
    pub async fn bind(addr: SocketAddr, state: ControlState) -> Result<Self, DaemonError> {
        let listener = server::bind(Listener::Control, addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DaemonError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn router(state: ControlState) -> Router {
        Router::new()
            .route(HELLO_PATH, get(hello).post(hello))
            .route(FLUSH_PATH, get(flush).post(flush))
            .with_state(state)
    }

    pub fn spawn(self) -> Result<ServerHandle, DaemonError> {
        let shutdown = self.state.shutdown.clone();
        let router = Self::router(self.state);
        // The runtime keeps its control connection idle between invocations.
        ServerHandle::spawn(Listener::Control, self.listener, router, shutdown, None)
    }
}

async fn hello(State(state): State<ControlState>) -> Response {
    debug!("ControlServer: hit on the hello route");
    let result = state.wait_ready("hello").await.map(|_| StatusCode::OK);
    state.record("hello", result)
}

async fn flush(State(state): State<ControlState>) -> Response {
    debug!("ControlServer: hit on the flush route");
    let result = flush_sink(&state).await;
    state.record("flush", result)
}

async fn flush_sink(state: &ControlState) -> Result<StatusCode, RequestError> {
    state.wait_ready("flush").await?;

    let Some(sink) = state.sink.get() else {
        warn!("ControlServer: flush requested but no metrics sink is assigned");
        return Err(RequestError::SinkUnavailable);
    };

    let started = Instant::now();
    sink.flush(true).await.map_err(|e| {
        error!("ControlServer: synchronous flush failed: {:#}", e);
        RequestError::FlushFailed {
            reason: format!("{:#}", e),
        }
    })?;

    let took = started.elapsed();
    state.metrics.observe_flush(took);
    debug!("ControlServer: synchronous flush completed in {:?}", took);
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockMetricsSink;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> ControlState {
        ControlState {
            gate: Arc::new(ReadinessGate::new()),
            sink: Arc::new(MetricsSinkHandle::new()),
            metrics: DaemonMetrics::new().expect("Failed to create metrics"),
            shutdown: CancellationToken::new(),
        }
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_hello_ok_when_ready() {
        let state = state();
        state.gate.open();

        let response = ControlServer::router(state)
            .oneshot(request(HELLO_PATH))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_hello_blocks_until_ready() {
        let state = state();
        let router = ControlServer::router(state.clone());

        let pending = tokio::spawn(router.oneshot(request(HELLO_PATH)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        state.gate.open();
        let response = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("hello should unblock")
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_flush_without_sink_is_503() {
        let state = state();
        state.gate.open();

        let response = ControlServer::router(state.clone())
            .oneshot(request(FLUSH_PATH))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "metrics sink not ready");
        assert!(
            state
                .metrics
                .encode_text()
                .contains("route=\"flush\",status=\"503\"")
        );
    }

    #[tokio::test]
    async fn test_flush_calls_sink_synchronously() {
        let state = state();
        let sink = MockMetricsSink::with_delay(Duration::from_millis(30));
        state.sink.assign(Arc::new(sink.clone())).unwrap();
        state.gate.open();

        let response = ControlServer::router(state)
            .oneshot(request(FLUSH_PATH))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].synchronous);
    }

    #[tokio::test]
    async fn test_flush_failure_is_500() {
        let state = state();
        let sink = MockMetricsSink::new();
        sink.set_failing(true);
        state.sink.assign(Arc::new(sink)).unwrap();
        state.gate.open();

        let response = ControlServer::router(state)
            .oneshot(request(FLUSH_PATH))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("configured to fail"));
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_hello() {
        let state = state();
        let router = ControlServer::router(state.clone());

        let pending = tokio::spawn(router.oneshot(request(HELLO_PATH)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        state.shutdown.cancel();
        let response = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("hello should be released by shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "daemon shutting down");
    }

    #[tokio::test]
    async fn test_get_is_accepted() {
        let state = state();
        state.gate.open();

        let request = Request::builder()
            .uri(HELLO_PATH)
            .body(Body::empty())
            .unwrap();
        let response = ControlServer::router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
