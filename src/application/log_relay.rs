//! HTTP listener receiving platform logs and relaying them in-process.
//!
//! Each POST body is read in full and pushed, verbatim, onto a bounded
//! channel. When the channel is full the handler waits, which pushes back on
//! the log source; it gives up after the write timeout and answers 503 so the
//! source can retry. The consumer sees the channel close only once the server
//! task has finished and every sender it held is gone.
//!
//! The read timeout applies twice: the request head must arrive within it
//! (enforced per connection by the listener) and so must the body.

use crate::application::server::{self, ServerHandle};
use crate::config::LogRelayEnvConfig;
use crate::domain::errors::{DaemonError, Listener, RequestError};
use crate::domain::types::LogPayload;
use crate::infrastructure::observability::DaemonMetrics;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::net::IpAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Consumer side of the relay channel.
#[derive(Debug)]
pub struct LogStream {
    rx: mpsc::Receiver<LogPayload>,
}

impl LogStream {
    /// Next payload, or `None` once the relay server has stopped.
    pub async fn recv(&mut self) -> Option<LogPayload> {
        self.rx.recv().await
    }

    /// Number of payloads waiting to be consumed.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}

impl Stream for LogStream {
    type Item = LogPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Clone)]
struct RelayState {
    tx: mpsc::Sender<LogPayload>,
    metrics: DaemonMetrics,
    read_timeout: Duration,
    write_timeout: Duration,
    max_payload_bytes: Option<usize>,
    shutdown: CancellationToken,
}

pub struct LogRelayServer;

impl LogRelayServer {
    /// Bind the log listener and start serving.
    ///
    /// Returns the URL the platform should POST logs to, the stream the
    /// consumer drains, and the server handle used to stop it.
    pub async fn start(
        config: &LogRelayEnvConfig,
        metrics: DaemonMetrics,
        shutdown: CancellationToken,
    ) -> Result<(Url, LogStream, ServerHandle), DaemonError> {
        let tcp = server::bind(Listener::LogRelay, config.socket_addr()).await?;
        let port = tcp.local_addr()?.port();
        let url = advertised_url(&config.advertised_host, port)?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let state = RelayState {
            tx,
            metrics,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_payload_bytes: config.max_payload_bytes,
            shutdown: shutdown.clone(),
        };

        let router = Router::new().fallback(ingest).with_state(state);
        let handle = ServerHandle::spawn(
            Listener::LogRelay,
            tcp,
            router,
            shutdown,
            Some(config.read_timeout),
        )?;
        info!(
            "LogRelayServer: logs collection server started, advertising {} (capacity {})",
            url, config.channel_capacity
        );

        Ok((url, LogStream { rx }, handle))
    }
}

fn advertised_url(host: &str, port: u16) -> Result<Url, DaemonError> {
    let raw = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("http://[{}]:{}", ip, port),
        _ => format!("http://{}:{}", host, port),
    };
    Url::parse(&raw).map_err(|source| DaemonError::InvalidAdvertisedUrl { url: raw, source })
}

async fn ingest(
    State(state): State<RelayState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match relay(&state, method, &headers, body).await {
        Ok(status) => status.into_response(),
        Err(e) => {
            warn!("LogRelayServer: rejected payload: {}", e);
            state.metrics.inc_rejected(rejection_reason(&e));
            e.into_response()
        }
    }
}

async fn relay(
    state: &RelayState,
    method: Method,
    headers: &HeaderMap,
    body: Body,
) -> Result<StatusCode, RequestError> {
    if method != Method::POST {
        return Err(RequestError::MethodNotAllowed {
            method: method.to_string(),
        });
    }

    let limit = state.max_payload_bytes.unwrap_or(usize::MAX);
    if let Some(declared) = content_length(headers) {
        if declared > limit {
            return Err(RequestError::PayloadTooLarge { limit });
        }
    }

    let data = tokio::time::timeout(state.read_timeout, read_body(body, limit))
        .await
        .map_err(|_| RequestError::ReadTimeout {
            timeout: state.read_timeout,
        })??;

    let payload = LogPayload::new(data);
    let len = payload.len();

    debug!("LogRelayServer: writing {} bytes into the relay channel", len);
    tokio::select! {
        sent = tokio::time::timeout(state.write_timeout, state.tx.send(payload)) => match sent {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(RequestError::RelayClosed),
            Err(_) => {
                return Err(RequestError::RelayBackpressureTimeout {
                    timeout: state.write_timeout,
                })
            }
        },
        _ = state.shutdown.cancelled() => return Err(RequestError::ShuttingDown),
    }
    debug!("LogRelayServer: wrote {} bytes into the relay channel", len);

    state.metrics.record_payload(len);
    Ok(StatusCode::OK)
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, RequestError> {
    let mut chunks = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| RequestError::BodyRead {
            reason: e.to_string(),
        })?;
        if buf.len().saturating_add(chunk.len()) > limit {
            return Err(RequestError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn rejection_reason(error: &RequestError) -> &'static str {
    match error {
        RequestError::MethodNotAllowed { .. } => "method",
        RequestError::PayloadTooLarge { .. } => "too_large",
        RequestError::ReadTimeout { .. } => "read_timeout",
        RequestError::BodyRead { .. } => "body_read",
        RequestError::RelayBackpressureTimeout { .. } => "backpressure",
        RequestError::RelayClosed => "closed",
        RequestError::ShuttingDown => "shutdown",
        RequestError::SinkUnavailable | RequestError::FlushFailed { .. } => "other",
    }
}
