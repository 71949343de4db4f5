//! Shutdown callbacks run under an enforced timeout
//!
//! The callback runs on its own task (or the blocking pool) so that a hung
//! callback can be abandoned when the timeout fires.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

/// Ways a shutdown callback can fail
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("shutdown handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("shutdown handler failed: {0:#}")]
    Failed(#[source] anyhow::Error),

    #[error("shutdown handler panicked: {0}")]
    Panicked(String),
}

enum Callback {
    Async(Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>),
    Blocking(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
}

/// A zero-argument callback invoked once during shutdown
pub struct ShutdownHandler {
    callback: Callback,
}

impl ShutdownHandler {
    /// Wrap an async callback
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            callback: Callback::Async(Box::new(move || f().boxed())),
        }
    }

    /// Wrap a callback that may block the calling thread
    pub fn blocking<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            callback: Callback::Blocking(Box::new(f)),
        }
    }

    /// Run the callback, giving up after `timeout`
    ///
    /// On timeout the callback's task is detached, not cancelled: blocking
    /// callbacks keep their thread until they return or the process exits.
    pub async fn invoke(self, timeout: Duration) -> Result<(), HandlerError> {
        let started = Instant::now();
        let handle = match self.callback {
            Callback::Async(f) => tokio::spawn(f()),
            Callback::Blocking(f) => tokio::task::spawn_blocking(f),
        };

        let result = match tokio::time::timeout(timeout, handle).await {
            Err(_) => Err(HandlerError::Timeout(timeout)),
            Ok(Err(join_err)) => Err(HandlerError::Panicked(panic_message(join_err))),
            Ok(Ok(Err(e))) => Err(HandlerError::Failed(e)),
            Ok(Ok(Ok(()))) => Ok(()),
        };
        debug!(elapsed = ?started.elapsed(), ok = result.is_ok(), "Shutdown handler finished");
        result
    }
}

impl std::fmt::Debug for ShutdownHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.callback {
            Callback::Async(_) => "async",
            Callback::Blocking(_) => "blocking",
        };
        f.debug_struct("ShutdownHandler").field("kind", &kind).finish()
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod tests;
