//! Application deputy
//!
//! Ties the application lifecycle to the health endpoints and process exit:
//! - `readied()` flips the readiness probe to passing
//! - `shutdown()` fails both probes, runs the shutdown handler under its
//!   timeout, then exits the process with status 1

use crate::config::{HealthServerConfig, DEFAULT_SHUTDOWN_HANDLER_TIMEOUT};
use crate::exit::{Exit, DEFAULT_EXIT_CODE};
use crate::handler::{HandlerError, ShutdownHandler};
use crate::server::{self, HealthServer, HealthState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// What a call to [`Deputy::shutdown`] did before requesting exit
///
/// Only observable when the exit backend does not end the process.
#[derive(Debug)]
pub struct Termination {
    /// Code of the winning exit request
    pub code: i32,
    /// Handler result, `None` if there was no handler left to run
    pub handler: Option<Result<(), HandlerError>>,
}

struct Inner {
    health: HealthState,
    // Doubles as the single-flight guard for shutdown
    handler: Mutex<Option<ShutdownHandler>>,
    handler_timeout: Duration,
    exit: Exit,
}

/// Health state, health endpoints and shutdown handling for one application
///
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct Deputy {
    inner: Arc<Inner>,
}

pub struct DeputyBuilder {
    handler: Option<ShutdownHandler>,
    handler_timeout: Duration,
    exit: Option<Exit>,
}

impl DeputyBuilder {
    /// Callback run by [`Deputy::shutdown`]
    ///
    /// It may request its own exit status through the deputy's [`Exit`]
    /// handle (or `std::process::exit`); otherwise the status is 1.
    pub fn shutdown_handler(mut self, handler: ShutdownHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn shutdown_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Exit handle to use instead of the process-wide one
    pub fn exit(mut self, exit: Exit) -> Self {
        self.exit = Some(exit);
        self
    }

    pub fn build(self) -> Deputy {
        Deputy {
            inner: Arc::new(Inner {
                health: HealthState::new(),
                handler: Mutex::new(self.handler),
                handler_timeout: self.handler_timeout,
                exit: self.exit.unwrap_or_else(Exit::process),
            }),
        }
    }
}

impl Deputy {
    /// Deputy without a shutdown handler
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DeputyBuilder {
        DeputyBuilder {
            handler: None,
            handler_timeout: DEFAULT_SHUTDOWN_HANDLER_TIMEOUT,
            exit: None,
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.inner.health
    }

    pub fn exit_handle(&self) -> Exit {
        self.inner.exit.clone()
    }

    pub fn shutdown_handler_timeout(&self) -> Duration {
        self.inner.handler_timeout
    }

    /// Start the health endpoints for this deputy
    ///
    /// Start this before slow initialization so probes see "not ready"
    /// rather than a refused connection.
    pub async fn serve(&self, config: HealthServerConfig) -> Result<HealthServer, std::io::Error> {
        server::serve(config, self.inner.health.clone()).await
    }

    /// Mark the application as ready
    pub fn readied(&self) {
        if self.inner.health.set_ready() {
            info!("Application ready");
        } else {
            warn!("Ignoring readied() during shutdown");
        }
    }

    /// Shut the application down and exit the process
    ///
    /// The liveness probe fails before the handler starts. Concurrent callers
    /// queue behind the first; the handler runs at most once. With the real
    /// exit backend this never returns.
    pub async fn shutdown(&self) -> Termination {
        let mut handler = self.inner.handler.lock().await;

        if self.inner.health.set_not_live() {
            info!("Shutdown initiated, health probes now failing");
        }

        let outcome = match handler.take() {
            Some(h) => {
                let timeout = self.inner.handler_timeout;
                let result = h.invoke(timeout).await;
                match &result {
                    Ok(()) => info!("Shutdown handler completed"),
                    Err(e @ HandlerError::Timeout(_)) => {
                        warn!(error = %e, "Shutdown handler timed out, exiting anyway")
                    }
                    Err(e) => error!(error = %e, "Shutdown handler failed, exiting anyway"),
                }
                Some(result)
            }
            None => None,
        };

        self.inner.exit.exit(DEFAULT_EXIT_CODE);
        Termination {
            code: self.inner.exit.requested().unwrap_or(DEFAULT_EXIT_CODE),
            handler: outcome,
        }
    }

    /// Callback for [`crate::terminator::graceful_terminator`] that shuts
    /// this deputy down
    pub fn terminator_callback(&self) -> ShutdownHandler {
        let deputy = self.clone();
        ShutdownHandler::new(move || async move {
            deputy.shutdown().await;
            Ok(())
        })
    }
}

impl Default for Deputy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Deputy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deputy")
            .field("health", &self.inner.health.status())
            .field("handler_timeout", &self.inner.handler_timeout)
            .field("exit", &self.inner.exit)
            .finish()
    }
}

#[cfg(test)]
#[path = "deputy_test.rs"]
mod tests;
