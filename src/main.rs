use clap::{Parser, Subcommand};
use k8s_deputy::terminator::{GracefulTerminator, IpcDir, Wait};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Kubernetes lifecycle helper for services using k8s-deputy
#[derive(Debug, Parser)]
#[command(name = "k8s-deputy", version)]
struct Cli {
    /// Directory holding termination channels (defaults to DEPUTY_IPC_DIR or the temp dir)
    #[arg(long, global = true)]
    ipc_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the graceful terminator of a process (for a preStop hook)
    Terminate {
        /// Target process id (defaults to the recorded entrypoint)
        pid: Option<u32>,

        /// Return as soon as the request is delivered
        #[arg(long, conflicts_with = "timeout")]
        no_wait: bool,

        /// Give up waiting for the target after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the pid recorded as entrypoint
    Entrypoint,
}

impl Command {
    fn wait(no_wait: bool, timeout: Option<u64>) -> Wait {
        match (no_wait, timeout) {
            (true, _) => Wait::No,
            (false, Some(secs)) => Wait::AcknowledgedWithin(Duration::from_secs(secs)),
            (false, None) => Wait::Acknowledged,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ipc = cli.ipc_dir.map(IpcDir::new).unwrap_or_else(IpcDir::from_env);
    let terminator = GracefulTerminator::new(ipc);

    match cli.command {
        Command::Terminate {
            pid,
            no_wait,
            timeout,
        } => {
            terminator
                .trigger(pid, Command::wait(no_wait, timeout))
                .await?;
            info!("Graceful termination complete");
        }
        Command::Entrypoint => {
            println!("{}", terminator.entrypoint_pid()?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
