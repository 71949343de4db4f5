//! Kubernetes process lifecycle deputy
//!
//! Health probes plus graceful termination for long-running services:
//!
//! ```no_run
//! use k8s_deputy::{graceful_terminator, Deputy, HealthServerConfig, RegisterOptions};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let deputy = Deputy::new();
//! let _server = deputy
//!     .serve(HealthServerConfig::from_env().with_host(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
//!     .await?;
//! graceful_terminator(deputy.terminator_callback(), RegisterOptions::default())?;
//!
//! // Application initialization
//!
//! deputy.readied();
//! # Ok(())
//! # }
//! ```
//!
//! The pod's `preStop` hook then runs `k8s-deputy terminate`.

pub mod config;
pub mod deputy;
pub mod exit;
pub mod handler;
pub mod server;
pub mod terminator;

pub use crate::config::HealthServerConfig;
pub use crate::deputy::{Deputy, DeputyBuilder, Termination};
pub use crate::exit::{Exit, ProcessExit, RecordingExit, StdProcessExit, DEFAULT_EXIT_CODE};
pub use crate::handler::{HandlerError, ShutdownHandler};
pub use crate::server::{HealthServer, HealthState, HealthStatus};
pub use crate::terminator::{
    entrypoint_pid, graceful_terminate, graceful_terminator, GracefulTerminator, IpcDir,
    RegisterOptions, TerminatorError, TerminatorState, Wait,
};
