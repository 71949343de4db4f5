//! Health check endpoints for Kubernetes probes
//!
//! - `/health/live` - Liveness: Is the process alive and not shutting down?
//! - `/health/ready` - Readiness: Has the application declared itself ready?

use super::state::{HealthState, HealthStatus};
use crate::config::HealthServerConfig;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Liveness probe handler
///
/// Returns 200 OK while live, 503 Service Unavailable once shutdown began.
async fn live(State(health): State<HealthState>) -> (StatusCode, Json<HealthStatus>) {
    let status = health.status();
    (probe_code(status.live), Json(status))
}

/// Readiness probe handler
///
/// Returns 200 OK if ready, 503 Service Unavailable if not.
async fn ready(State(health): State<HealthState>) -> (StatusCode, Json<HealthStatus>) {
    let status = health.status();
    (probe_code(status.ready), Json(status))
}

fn probe_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Build the health router
pub fn router(health: HealthState) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(health)
}

/// Handle to a running health server
#[derive(Debug)]
pub struct HealthServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl HealthServer {
    /// Address the server is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the serving task is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting connections and wait for in-flight probes to finish
    ///
    /// Safe to call while the process is shutting down; failures are logged.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Receiver is gone if the server already stopped on its own
            let _ = tx.send(());
        }
        match (&mut self.task).await {
            Ok(Ok(())) => info!(addr = %self.local_addr, "Health server stopped"),
            Ok(Err(e)) => warn!(error = %e, "Health server failed"),
            Err(e) => warn!(error = %e, "Health server task did not finish cleanly"),
        }
    }
}

/// Start the health server
///
/// Binds before returning so bind errors reach the caller, then serves on a
/// background task:
/// - GET /health/live - 200 OK while live, 503 otherwise
/// - GET /health/ready - 200 OK if ready, 503 otherwise
pub async fn serve(
    config: HealthServerConfig,
    health: HealthState,
) -> Result<HealthServer, std::io::Error> {
    let listener = TcpListener::bind(config.socket_addr()).await?;
    let local_addr = listener.local_addr()?;
    // Log after successful bind - server is actually listening
    info!(addr = %local_addr, "Health server listening");

    let (tx, rx) = oneshot::channel::<()>();
    let app = router(health);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                // Dropping the handle without stop() keeps the server up
                if rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            })
            .await
    });

    Ok(HealthServer {
        local_addr,
        shutdown: Some(tx),
        task,
    })
}
