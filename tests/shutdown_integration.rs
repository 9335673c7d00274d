use serverless_daemon::application::system::Daemon;
use serverless_daemon::config::Config;
use serverless_daemon::domain::types::DaemonPhase;
use serverless_daemon::infrastructure::mock::MockMetricsSink;
use serverless_daemon::infrastructure::observability::DaemonMetrics;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn loopback_config() -> Config {
    let mut config = Config::default();
    config.control.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.control.port = 0;
    config.log_relay.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.log_relay.port = 0;
    config.log_relay.advertised_host = "127.0.0.1".to_string();
    config
}

async fn start_daemon() -> Daemon {
    let metrics = DaemonMetrics::new().expect("Failed to create metrics");
    Daemon::start(&loopback_config(), metrics)
        .await
        .expect("daemon should start")
}

/// Test: A hello parked on a gate that never opens is released with 503 as
/// soon as shutdown starts, well before the grace period runs out.
#[tokio::test]
async fn test_shutdown_releases_blocked_hello() {
    let mut daemon = start_daemon().await;
    let addr = daemon.control_addr();

    let hello = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://{}/lambda/hello", addr))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!hello.is_finished());

    let started = Instant::now();
    daemon.shutdown(Duration::from_secs(10)).await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "shutdown should not wait for the grace period, took {:?}",
        started.elapsed()
    );
    assert_eq!(daemon.phase(), DaemonPhase::Stopped);

    let response = tokio::time::timeout(Duration::from_secs(2), hello)
        .await
        .expect("hello must not hang after shutdown")
        .unwrap()
        .expect("hello should receive a response");
    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(response.text().await.unwrap(), "daemon shutting down");
}

/// Test: New connections are refused once the daemon stopped.
#[tokio::test]
async fn test_listener_closed_after_shutdown() {
    let mut daemon = start_daemon().await;
    daemon.open_gate();
    let addr = daemon.control_addr();

    daemon.shutdown(Duration::from_secs(1)).await;

    let result = reqwest::Client::new()
        .post(format!("http://{}/lambda/hello", addr))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}

/// Test: An in-flight flush is allowed to finish within the grace period.
#[tokio::test]
async fn test_in_flight_flush_completes_during_grace() {
    let mut daemon = start_daemon().await;
    let sink = MockMetricsSink::with_delay(Duration::from_millis(500));
    daemon.mark_metrics_ready(Arc::new(sink.clone())).unwrap();
    let addr = daemon.control_addr();

    let flush = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://{}/lambda/flush", addr))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    daemon.shutdown(Duration::from_secs(5)).await;

    let response = flush.await.unwrap().expect("flush should complete");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(sink.flush_count().await, 1);
}

/// Test: Shutdown is reported through the phase and is idempotent.
#[tokio::test]
async fn test_shutdown_twice() {
    let mut daemon = start_daemon().await;
    let coordinator = daemon.shutdown_coordinator();

    coordinator.trigger();
    assert_eq!(daemon.phase(), DaemonPhase::ShuttingDown);

    daemon.shutdown(Duration::from_secs(1)).await;
    daemon.shutdown(Duration::from_secs(1)).await;
    assert_eq!(daemon.phase(), DaemonPhase::Stopped);
}
