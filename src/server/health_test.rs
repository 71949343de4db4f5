//! Tests for health endpoints

use super::*;
use crate::config::HealthServerConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Start a server on a free localhost port
async fn start(health: HealthState) -> HealthServer {
    let config = HealthServerConfig::from_env()
        .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_port(0);
    serve(config, health)
        .await
        .expect("Failed to start health server")
}

async fn probe(server: &HealthServer, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("http://{}{}", server.local_addr(), path))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server")
}

/// Test that /health/live returns 200 while live
#[tokio::test]
async fn test_live_returns_200() {
    // ARRANGE
    let server = start(HealthState::new()).await;

    // ACT
    let response = probe(&server, "/health/live").await;

    // ASSERT
    assert_eq!(response.status(), 200, "Liveness probe should return 200");
    let body: HealthStatus = response.json().await.expect("JSON body");
    assert!(body.live);

    server.stop().await;
}

/// Test that /health/ready returns 503 when not ready
#[tokio::test]
async fn test_ready_returns_503_when_not_ready() {
    let health = HealthState::new();
    assert!(!health.is_ready(), "Should start as not ready");
    let server = start(health).await;

    let response = probe(&server, "/health/ready").await;

    assert_eq!(
        response.status(),
        503,
        "Readiness probe should return 503 when not ready"
    );
    let body = response.text().await.expect("should have body");
    assert!(!body.is_empty(), "Failure responses should carry a body");

    server.stop().await;
}

/// Test the full probe lifecycle: startup, readied, shutdown
#[tokio::test]
async fn test_probe_lifecycle() {
    let health = HealthState::new();
    let server = start(health.clone()).await;

    // Started before initialization completes: not ready, but reachable
    assert_eq!(probe(&server, "/health/live").await.status(), 200);
    assert_eq!(probe(&server, "/health/ready").await.status(), 503);

    health.set_ready();
    assert_eq!(probe(&server, "/health/ready").await.status(), 200);

    health.set_not_live();
    assert_eq!(probe(&server, "/health/live").await.status(), 503);
    assert_eq!(probe(&server, "/health/ready").await.status(), 503);

    server.stop().await;
}

/// Test that unknown paths are not served
#[tokio::test]
async fn test_unknown_path_returns_404() {
    let server = start(HealthState::new()).await;

    assert_eq!(probe(&server, "/healthz").await.status(), 404);

    server.stop().await;
}

/// Test that binding a port in use surfaces the error
#[tokio::test]
async fn test_bind_error_is_returned() {
    let first = start(HealthState::new()).await;
    let config = HealthServerConfig::from_env()
        .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_port(first.local_addr().port());

    let result = serve(config, HealthState::new()).await;

    assert!(result.is_err(), "Second bind on same port should fail");
    first.stop().await;
}

/// Test that stop() shuts the server down
#[tokio::test]
async fn test_stop_closes_listener() {
    let server = start(HealthState::new()).await;
    let addr = server.local_addr();
    assert!(server.is_running());

    server.stop().await;

    let result = reqwest::Client::new()
        .get(format!("http://{}/health/live", addr))
        .timeout(Duration::from_millis(500))
        .send()
        .await;
    assert!(result.is_err(), "Stopped server should refuse connections");
}
