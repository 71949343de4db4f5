//! Process exit gate
//!
//! Every component that wants the process gone goes through an [`Exit`]
//! handle. The first request wins and later requests are ignored, so a
//! shutdown handler can pick its own status before the deputy falls back to
//! [`DEFAULT_EXIT_CODE`].

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info};

/// Status used by the deputy and the terminator unless a handler exits first
pub const DEFAULT_EXIT_CODE: i32 = 1;

/// Backend that actually tears the process down
pub trait ProcessExit: Send + Sync + 'static {
    fn exit(&self, code: i32);
}

/// Terminates the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}

/// Records exit requests instead of exiting
///
/// Clones share the same record.
#[derive(Debug, Default, Clone)]
pub struct RecordingExit {
    codes: Arc<Mutex<Vec<i32>>>,
}

impl RecordingExit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every code that reached the backend, in order
    pub fn codes(&self) -> Vec<i32> {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code);
    }
}

struct ExitGate {
    code: OnceLock<i32>,
    backend: Box<dyn ProcessExit>,
}

/// Clonable first-request-wins exit handle
#[derive(Clone)]
pub struct Exit {
    gate: Arc<ExitGate>,
}

impl Exit {
    /// Exit handle shared by everything in this process that uses the real backend
    pub fn process() -> Self {
        static PROCESS: OnceLock<Exit> = OnceLock::new();
        PROCESS
            .get_or_init(|| Exit::with_backend(StdProcessExit))
            .clone()
    }

    pub fn with_backend(backend: impl ProcessExit) -> Self {
        Self {
            gate: Arc::new(ExitGate {
                code: OnceLock::new(),
                backend: Box::new(backend),
            }),
        }
    }

    /// Request process exit with `code`
    ///
    /// Only the first request reaches the backend. With the real backend this
    /// never returns.
    pub fn exit(&self, code: i32) {
        if self.gate.code.set(code).is_ok() {
            info!(code, "Exiting process");
            self.gate.backend.exit(code);
        } else {
            debug!(
                code,
                winner = ?self.gate.code.get(),
                "Exit already requested, ignoring"
            );
        }
    }

    /// Code of the winning exit request, if any
    pub fn requested(&self) -> Option<i32> {
        self.gate.code.get().copied()
    }
}

impl Default for Exit {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exit")
            .field("requested", &self.requested())
            .finish()
    }
}

#[cfg(test)]
#[path = "exit_test.rs"]
mod tests;
