//! HTTP server for health endpoints
//!
//! Provides Kubernetes health probes:
//! - `/health/live` - Liveness probe (process is running and not shutting down)
//! - `/health/ready` - Readiness probe (application declared itself ready)

mod health;
mod state;

pub use health::{router, serve, HealthServer};
pub use state::{HealthState, HealthStatus};

#[cfg(test)]
#[path = "health_test.rs"]
mod tests;
