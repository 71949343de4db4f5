//! Termination channel between processes on the same host
//!
//! Each listening process owns a Unix domain socket named after its pid in
//! the IPC directory. A connection carries one request line from the caller
//! and, best effort, one acknowledgement line back.

use super::entrypoint::EntrypointStore;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tracing::{debug, warn};

const REQUEST: &str = "TERM";
const ACK: &str = "ACK";

/// Longest request line accepted, newline included
const MAX_LINE: u64 = 64;

/// How long a connected peer gets to send its request line
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Directory holding the channels and the entrypoint record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcDir {
    dir: PathBuf,
}

impl IpcDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory from `DEPUTY_IPC_DIR`, else the system temp dir
    pub fn from_env() -> Self {
        Self::new(crate::config::ipc_dir())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn channel_path(&self, pid: u32) -> PathBuf {
        self.dir.join(format!("graceful-terminator.{pid}.sock"))
    }

    pub fn entrypoint(&self) -> EntrypointStore {
        EntrypointStore::new(self.dir.clone())
    }
}

/// How a waiting caller learned that the target handled its request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The target wrote an acknowledgement
    Received,
    /// The target closed the channel, usually by exiting
    Closed,
}

/// Listening end of a process's termination channel
#[derive(Debug)]
pub struct ChannelListener {
    listener: UnixListener,
    path: PathBuf,
}

impl ChannelListener {
    /// Bind the channel for `pid`, replacing a stale socket file
    ///
    /// Fails with [`io::ErrorKind::AddrInUse`] if a live listener already
    /// owns the channel. Must be called from within a Tokio runtime.
    pub fn bind(dir: &IpcDir, pid: u32) -> io::Result<Self> {
        std::fs::create_dir_all(dir.path())?;
        let path = dir.channel_path(pid);

        // Only a socket nobody answers on is stale
        if std::os::unix::net::UnixStream::connect(&path).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} has a live listener", path.display()),
            ));
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale channel"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for a connection carrying a valid termination request
    ///
    /// Each connection's request is read on its own task, so silent peers
    /// cannot hold up a real request. Connections with anything else are
    /// dropped and the wait continues.
    pub async fn accept_request(&self) -> io::Result<UnixStream> {
        let mut pending = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _) = accepted?;
                    pending.spawn(read_request(stream));
                }
                Some(joined) = pending.join_next() => match joined {
                    Ok(Some(stream)) => return Ok(stream),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Termination request reader failed"),
                },
            }
        }
    }
}

/// Read the request line of one connection, keeping the stream if it is valid
async fn read_request(mut stream: UnixStream) -> Option<UnixStream> {
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_line(&mut stream)).await {
        Ok(Ok(line)) if line == REQUEST => return Some(stream),
        Ok(Ok(line)) if line.is_empty() => debug!("Peer closed without a termination request"),
        Ok(Ok(line)) => warn!(request = %line, "Ignoring unknown termination request"),
        Ok(Err(e)) => warn!(error = %e, "Failed to read termination request"),
        Err(_) => warn!(
            timeout = ?REQUEST_READ_TIMEOUT,
            "Peer connected but sent no termination request"
        ),
    }
    None
}

/// Connect to the channel of `pid`
pub async fn connect(dir: &IpcDir, pid: u32) -> io::Result<UnixStream> {
    UnixStream::connect(dir.channel_path(pid)).await
}

pub async fn send_request(stream: &mut UnixStream) -> io::Result<()> {
    stream.write_all(format!("{REQUEST}\n").as_bytes()).await?;
    stream.flush().await
}

pub async fn send_ack(stream: &mut UnixStream) -> io::Result<()> {
    stream.write_all(format!("{ACK}\n").as_bytes()).await?;
    stream.shutdown().await
}

/// Block until the target acknowledges or goes away
pub async fn wait_for_ack(stream: &mut UnixStream) -> io::Result<Ack> {
    match read_line(stream).await {
        Ok(line) if line == ACK => Ok(Ack::Received),
        Ok(line) if line.is_empty() => Ok(Ack::Closed),
        Ok(line) => {
            warn!(response = %line, "Unexpected acknowledgement, treating channel as closed");
            Ok(Ack::Closed)
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            Ok(Ack::Closed)
        }
        Err(e) => Err(e),
    }
}

/// Read one line, without its terminator; empty on EOF
async fn read_line(stream: &mut UnixStream) -> io::Result<String> {
    let mut reader = BufReader::new(stream.take(MAX_LINE));
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line.trim_end().to_string())
}

#[cfg(test)]
#[path = "ipc_test.rs"]
mod tests;
