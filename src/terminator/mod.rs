//! Graceful termination without signal handlers
//!
//! A service registers a callback with [`graceful_terminator`]; a second
//! process (the Kubernetes `preStop` hook running `k8s-deputy terminate`)
//! calls [`graceful_terminate`] to run it. Channels and the entrypoint record
//! live in `DEPUTY_IPC_DIR`, so a read-only root filesystem only needs one
//! writable volume.

mod entrypoint;
mod ipc;
mod registrar;

pub use entrypoint::{EntrypointError, EntrypointRecord, EntrypointStore};
pub use ipc::{Ack, IpcDir};
pub use registrar::{GracefulTerminator, RegisterOptions, TerminatorError, TerminatorState, Wait};

use crate::handler::ShutdownHandler;
use std::sync::OnceLock;

/// Terminator for this process, configured from the environment
pub fn global() -> &'static GracefulTerminator {
    static GLOBAL: OnceLock<GracefulTerminator> = OnceLock::new();
    GLOBAL.get_or_init(GracefulTerminator::from_env)
}

/// Register the process-wide graceful termination callback
///
/// See [`GracefulTerminator::register`].
pub fn graceful_terminator(
    callback: ShutdownHandler,
    options: RegisterOptions,
) -> Result<(), TerminatorError> {
    global().register(callback, options)
}

/// Trigger the graceful terminator of `pid`, or of the entrypoint process
pub async fn graceful_terminate(pid: Option<u32>, wait: Wait) -> Result<(), TerminatorError> {
    global().trigger(pid, wait).await
}

/// Pid of the entrypoint process recorded in `DEPUTY_IPC_DIR`
pub fn entrypoint_pid() -> Result<u32, TerminatorError> {
    global().entrypoint_pid()
}
