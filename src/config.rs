//! Environment-driven configuration
//!
//! - `DEPUTY_HEALTH_CHECK_PORT` - port for the health endpoints (default 8081)
//! - `DEPUTY_IPC_DIR` - writable directory for the termination channels
//!   (default: the system temp directory)

use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding the health check port
pub const HEALTH_CHECK_PORT_ENV: &str = "DEPUTY_HEALTH_CHECK_PORT";

/// Environment variable overriding the IPC directory
pub const IPC_DIR_ENV: &str = "DEPUTY_IPC_DIR";

/// Port used when `DEPUTY_HEALTH_CHECK_PORT` is unset or invalid
pub const DEFAULT_HEALTH_CHECK_PORT: u16 = 8081;

/// Default maximum duration of a deputy shutdown handler
pub const DEFAULT_SHUTDOWN_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum duration of a graceful terminator callback
///
/// Matches the default Kubernetes `terminationGracePeriodSeconds`.
pub const DEFAULT_TERMINATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve the health check port from the environment
pub fn health_check_port() -> u16 {
    parse_health_check_port(std::env::var(HEALTH_CHECK_PORT_ENV).ok().as_deref())
}

/// Port for a raw `DEPUTY_HEALTH_CHECK_PORT` value
///
/// Unset or invalid values fall back to [`DEFAULT_HEALTH_CHECK_PORT`].
pub fn parse_health_check_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw else {
        return DEFAULT_HEALTH_CHECK_PORT;
    };
    match raw.trim().parse::<u16>() {
        Ok(port) => port,
        Err(e) => {
            warn!(
                value = %raw,
                error = %e,
                default = DEFAULT_HEALTH_CHECK_PORT,
                "Invalid {HEALTH_CHECK_PORT_ENV}, using default port"
            );
            DEFAULT_HEALTH_CHECK_PORT
        }
    }
}

/// Resolve the IPC directory from the environment
pub fn ipc_dir() -> PathBuf {
    parse_ipc_dir(std::env::var_os(IPC_DIR_ENV))
}

/// Directory for a raw `DEPUTY_IPC_DIR` value
///
/// Empty values are treated as unset.
pub fn parse_ipc_dir(raw: Option<OsString>) -> PathBuf {
    raw.filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Bind configuration for the health server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthServerConfig {
    /// Address to listen on
    pub host: IpAddr,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
}

impl HealthServerConfig {
    /// Create config from environment variables
    ///
    /// Listens on localhost. Use [`HealthServerConfig::with_host`] with
    /// `0.0.0.0` inside a container so the kubelet can reach the probes.
    pub fn from_env() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: health_check_port(),
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
