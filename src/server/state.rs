//! Liveness and readiness state shared with the health endpoints
//!
//! Both flags live in one atomic byte so a snapshot can never pair a
//! not-live process with a ready one.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const LIVE: u8 = 0b01;
const READY: u8 = 0b10;

/// Point-in-time view of the health flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
}

impl HealthStatus {
    fn from_bits(bits: u8) -> Self {
        Self {
            live: bits & LIVE != 0,
            ready: bits & READY != 0,
        }
    }
}

/// Shared health state
///
/// Starts live and not ready. Once not live it stays that way. Clone is
/// cheap and clones share state.
#[derive(Debug, Clone)]
pub struct HealthState {
    bits: Arc<AtomicU8>,
}

impl HealthState {
    /// Create a new health state (live, not ready)
    pub fn new() -> Self {
        Self {
            bits: Arc::new(AtomicU8::new(LIVE)),
        }
    }

    /// Mark the application as ready
    ///
    /// Ignored once shutdown has begun. Returns whether the state is ready
    /// after the call.
    pub fn set_ready(&self) -> bool {
        self.bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                (bits & LIVE != 0).then_some(bits | READY)
            })
            .is_ok()
    }

    /// Mark the application as shutting down
    ///
    /// Clears both flags. Returns true only for the call that performed the
    /// transition.
    pub fn set_not_live(&self) -> bool {
        self.bits.swap(0, Ordering::SeqCst) & LIVE != 0
    }

    /// Consistent snapshot of both flags
    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_bits(self.bits.load(Ordering::SeqCst))
    }

    pub fn is_live(&self) -> bool {
        self.status().live
    }

    pub fn is_ready(&self) -> bool {
        self.status().ready
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
