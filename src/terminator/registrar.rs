//! Graceful terminator registration and triggering
//!
//! A process registers one callback and listens on its termination channel.
//! Another process (typically a Kubernetes `preStop` hook) triggers it by pid,
//! or by the recorded entrypoint pid. The callback runs under a timeout and
//! the process exits afterwards no matter how the callback ended.

use super::entrypoint::EntrypointError;
use super::ipc::{self, Ack, ChannelListener, IpcDir};
use crate::config::DEFAULT_TERMINATOR_TIMEOUT;
use crate::exit::{Exit, DEFAULT_EXIT_CODE};
use crate::handler::{HandlerError, ShutdownHandler};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum TerminatorError {
    #[error("graceful terminator already registered in process {pid}")]
    DoubleRegistration { pid: u32 },

    #[error("graceful terminator requires a Tokio runtime")]
    NoRuntime,

    #[error("no entrypoint process registered in {}", .dir.display())]
    NoEntrypoint { dir: PathBuf },

    #[error("termination channel for process {pid} is unavailable: {source}")]
    ChannelUnavailable {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("process {pid} did not acknowledge termination within {timeout:?}")]
    AcknowledgementTimeout { pid: u32, timeout: Duration },

    #[error(transparent)]
    Entrypoint(#[from] EntrypointError),

    #[error("termination channel I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Lifecycle of a process's graceful terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorState {
    Unregistered,
    Registered,
    Listening,
    Invoking,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Record this process as the default trigger target
    pub set_entrypoint: bool,
    /// Maximum duration of the callback before the process exits anyway
    pub timeout: Duration,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            set_entrypoint: true,
            timeout: DEFAULT_TERMINATOR_TIMEOUT,
        }
    }
}

/// How long [`GracefulTerminator::trigger`] waits for the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return once the request is written
    No,
    /// Wait until the target acknowledges or closes the channel
    ///
    /// Bounded only by the target's own callback timeout.
    Acknowledged,
    /// Like `Acknowledged`, but give up after the duration
    AcknowledgedWithin(Duration),
}

/// Graceful terminator for one process
///
/// Clones share the registration state.
#[derive(Debug, Clone)]
pub struct GracefulTerminator {
    ipc: IpcDir,
    pid: u32,
    exit: Exit,
    state: Arc<Mutex<TerminatorState>>,
}

impl GracefulTerminator {
    /// Terminator for the current process using channels in `ipc`
    pub fn new(ipc: IpcDir) -> Self {
        Self {
            ipc,
            pid: std::process::id(),
            exit: Exit::process(),
            state: Arc::new(Mutex::new(TerminatorState::Unregistered)),
        }
    }

    /// Terminator for the current process configured from `DEPUTY_IPC_DIR`
    pub fn from_env() -> Self {
        Self::new(IpcDir::from_env())
    }

    /// Listen as `pid` instead of the current process id
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exit(mut self, exit: Exit) -> Self {
        self.exit = exit;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn ipc_dir(&self) -> &IpcDir {
        &self.ipc
    }

    pub fn state(&self) -> TerminatorState {
        *self.lock_state()
    }

    /// Register `callback` to run when this process is triggered
    ///
    /// Only one callback may be registered; a second call fails with
    /// [`TerminatorError::DoubleRegistration`] and leaves the first in place.
    /// This also holds across terminators sharing a pid and IPC directory:
    /// the channel of a live listener is never taken over.
    ///
    /// Returns once the channel is bound. Outside a Tokio runtime it fails
    /// with [`TerminatorError::NoRuntime`] and registers nothing.
    pub fn register(
        &self,
        callback: ShutdownHandler,
        options: RegisterOptions,
    ) -> Result<(), TerminatorError> {
        let runtime = Handle::try_current().map_err(|_| TerminatorError::NoRuntime)?;

        let mut state = self.lock_state();
        if *state != TerminatorState::Unregistered {
            return Err(TerminatorError::DoubleRegistration { pid: self.pid });
        }

        let listener = match ChannelListener::bind(&self.ipc, self.pid) {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                return Err(TerminatorError::DoubleRegistration { pid: self.pid });
            }
            Err(e) => return Err(e.into()),
        };
        if options.set_entrypoint {
            self.ipc.entrypoint().write(self.pid)?;
        }
        *state = TerminatorState::Registered;

        info!(
            pid = self.pid,
            channel = %listener.path().display(),
            entrypoint = options.set_entrypoint,
            timeout = ?options.timeout,
            "Graceful terminator registered"
        );

        runtime.spawn(listen(
            listener,
            callback,
            options.timeout,
            self.state.clone(),
            self.exit.clone(),
        ));
        *state = TerminatorState::Listening;
        Ok(())
    }

    /// Pid recorded as entrypoint in this terminator's IPC directory
    pub fn entrypoint_pid(&self) -> Result<u32, TerminatorError> {
        self.ipc
            .entrypoint()
            .pid()?
            .ok_or_else(|| TerminatorError::NoEntrypoint {
                dir: self.ipc.path().to_path_buf(),
            })
    }

    /// Ask process `target` (default: the entrypoint) to run its callback
    pub async fn trigger(&self, target: Option<u32>, wait: Wait) -> Result<(), TerminatorError> {
        let pid = match target {
            Some(pid) => pid,
            None => self.entrypoint_pid()?,
        };

        let unavailable = |source| TerminatorError::ChannelUnavailable { pid, source };
        let mut stream = ipc::connect(&self.ipc, pid).await.map_err(unavailable)?;
        ipc::send_request(&mut stream).await.map_err(unavailable)?;
        info!(pid, wait = ?wait, "Graceful termination requested");

        let ack = match wait {
            Wait::No => return Ok(()),
            Wait::Acknowledged => ipc::wait_for_ack(&mut stream).await?,
            Wait::AcknowledgedWithin(timeout) => {
                tokio::time::timeout(timeout, ipc::wait_for_ack(&mut stream))
                    .await
                    .map_err(|_| TerminatorError::AcknowledgementTimeout { pid, timeout })??
            }
        };

        match ack {
            Ack::Received => info!(pid, "Graceful termination acknowledged"),
            Ack::Closed => info!(pid, "Termination channel closed, target exited"),
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, TerminatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_state(state: &Mutex<TerminatorState>, next: TerminatorState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Background listener: wait for one request, run the callback, exit
async fn listen(
    listener: ChannelListener,
    callback: ShutdownHandler,
    timeout: Duration,
    state: Arc<Mutex<TerminatorState>>,
    exit: Exit,
) {
    let mut stream = match listener.accept_request().await {
        Ok(stream) => stream,
        Err(e) => {
            error!(
                error = %e,
                channel = %listener.path().display(),
                "Termination channel failed, graceful termination disabled"
            );
            return;
        }
    };
    // Later triggers are refused instead of queueing behind this one
    drop(listener);

    set_state(&state, TerminatorState::Invoking);
    info!(timeout = ?timeout, "Graceful termination received, running callback");

    match callback.invoke(timeout).await {
        Ok(()) => info!("Graceful terminator callback completed"),
        Err(e @ HandlerError::Timeout(_)) => {
            error!(error = %e, "Graceful terminator callback timed out")
        }
        Err(e) => error!(error = %e, "Graceful terminator callback failed"),
    }

    // The caller has its own bound if this never arrives
    if let Err(e) = ipc::send_ack(&mut stream).await {
        debug!(error = %e, "Could not acknowledge termination request");
    }

    set_state(&state, TerminatorState::Exited);
    exit.exit(DEFAULT_EXIT_CODE);
}

#[cfg(test)]
#[path = "registrar_test.rs"]
mod tests;
