//! Listener plumbing shared by the control and log relay servers.
//!
//! Connections are served by hyper directly rather than `axum::serve` so a
//! listener can bound how long a client may take to send its request head.
//! Without that, a client that connects and never finishes its headers holds
//! a socket and a task until the daemon exits.

use crate::domain::errors::{DaemonError, Listener};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub(crate) async fn bind(listener: Listener, addr: SocketAddr) -> Result<TcpListener, DaemonError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| DaemonError::Bind {
            listener,
            addr: addr.to_string(),
            source,
        })
}

/// A running HTTP server task.
#[derive(Debug)]
pub struct ServerHandle {
    listener: Listener,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Serve `router` on `tcp` until `shutdown` fires. Each connection runs on
    /// its own task, so a slow request never blocks the accept loop.
    ///
    /// With `header_read_timeout` set, a connection that has not delivered a
    /// complete request head within it is closed. This also closes idle
    /// keep-alive connections after the same delay.
    pub(crate) fn spawn(
        listener: Listener,
        tcp: TcpListener,
        router: Router,
        shutdown: CancellationToken,
        header_read_timeout: Option<Duration>,
    ) -> Result<Self, DaemonError> {
        let addr = tcp.local_addr()?;
        info!("Server[{}]: listening on {}", listener, addr);

        let mut builder = http1::Builder::new();
        if let Some(timeout) = header_read_timeout {
            builder.timer(TokioTimer::new()).header_read_timeout(timeout);
        }

        let task = tokio::spawn(accept_loop(
            listener,
            tcp,
            builder,
            header_read_timeout,
            router,
            shutdown,
        ));

        Ok(Self {
            listener,
            addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait up to `grace` for the server to drain after shutdown was
    /// signalled, then abort it. Aborting drops every connection task with
    /// it. Returns `true` on a clean stop.
    pub async fn stop(mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Server[{}]: task failed: {}", self.listener, e);
                false
            }
            Err(_) => {
                warn!(
                    "Server[{}]: in-flight requests still running after {:?}, aborting",
                    self.listener, grace
                );
                self.task.abort();
                false
            }
        }
    }
}

async fn accept_loop(
    listener: Listener,
    tcp: TcpListener,
    builder: http1::Builder,
    header_read_timeout: Option<Duration>,
    router: Router,
    shutdown: CancellationToken,
) {
    // Owned here so that aborting the server task also drops its connections.
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = tcp.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Server[{}]: connection from {}", listener, peer);
                    connections.spawn(serve_connection(
                        listener,
                        stream,
                        builder.clone(),
                        header_read_timeout,
                        router.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Server[{}]: accept failed: {}", listener, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Stop accepting before draining.
    drop(tcp);
    debug!(
        "Server[{}]: draining {} connection(s)",
        listener,
        connections.len()
    );
    while connections.join_next().await.is_some() {}
    info!("Server[{}]: stopped", listener);
}

async fn serve_connection(
    listener: Listener,
    stream: TcpStream,
    builder: http1::Builder,
    header_read_timeout: Option<Duration>,
    router: Router,
    shutdown: CancellationToken,
) {
    if let Some(timeout) = header_read_timeout {
        if !first_byte_within(&stream, timeout, &shutdown).await {
            debug!("Server[{}]: closing silent connection", listener);
            return;
        }
    }

    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            // Finish the in-flight request, then close.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!("Server[{}]: connection closed: {}", listener, e);
    }
}

/// hyper arms its header timer once it starts parsing; a client that connects
/// and stays silent is cut off here instead.
async fn first_byte_within(
    stream: &TcpStream,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> bool {
    let mut first = [0u8; 1];
    tokio::select! {
        peeked = tokio::time::timeout(timeout, stream.peek(&mut first)) => {
            matches!(peeked, Ok(Ok(n)) if n > 0)
        }
        _ = shutdown.cancelled() => false,
    }
}
