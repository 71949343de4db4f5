//! Entrypoint record
//!
//! The pid of the process that should receive a termination request when no
//! explicit target is given. Stored as JSON in the IPC directory so that an
//! unrelated process (the preStop hook) can find it. Records are overwritten,
//! never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const ENTRYPOINT_FILE: &str = "graceful-terminator.entrypoint";

#[derive(Debug, Error)]
pub enum EntrypointError {
    #[error("entrypoint record I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed entrypoint record at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointRecord {
    pub pid: u32,
    pub registered_at: DateTime<Utc>,
}

/// Reads and writes the entrypoint record inside one directory
#[derive(Debug, Clone)]
pub struct EntrypointStore {
    dir: PathBuf,
}

impl EntrypointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(ENTRYPOINT_FILE)
    }

    /// Record `pid` as the entrypoint, replacing any previous record
    ///
    /// Written to a temporary file and renamed so readers never see a
    /// partial record. Concurrent writers race; the last rename wins.
    pub fn write(&self, pid: u32) -> Result<EntrypointRecord, EntrypointError> {
        let record = EntrypointRecord {
            pid,
            registered_at: Utc::now(),
        };
        let path = self.path();
        let tmp = self.dir.join(format!("{ENTRYPOINT_FILE}.{pid}.tmp"));

        let json = serde_json::to_vec(&record).map_err(|source| EntrypointError::Malformed {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&tmp, json).map_err(|source| EntrypointError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| EntrypointError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(pid, path = %path.display(), "Entrypoint recorded");
        Ok(record)
    }

    /// Current record, or `None` if no entrypoint was ever registered here
    pub fn read(&self) -> Result<Option<EntrypointRecord>, EntrypointError> {
        let path = self.path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(EntrypointError::Io { path, source }),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| EntrypointError::Malformed { path, source })
    }

    pub fn pid(&self) -> Result<Option<u32>, EntrypointError> {
        Ok(self.read()?.map(|record| record.pid))
    }
}

#[cfg(test)]
#[path = "entrypoint_test.rs"]
mod tests;
