// duskd - minimal daemon skeleton built on the dusk library
//
// Demonstrates the intended call order: detach first, take the instance
// lock, then bring up logging and the async runtime. The runtime must never
// predate the fork; its worker threads and internal descriptors would not
// survive into the child.

use anyhow::Context;
use clap::Parser;
use dusk::config::DaemonConfig;
use dusk::daemon::{dev_null, Daemonizer, ForkOutcome};
use dusk::lock::{read_recorded_pid, InstanceLock, LockOutcome};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::info;

/// Minimal background daemon: detaches, takes the instance lock, and parks
/// until SIGTERM or SIGINT
#[derive(Parser)]
#[command(name = "duskd")]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stay in the foreground instead of detaching
    #[arg(short, long)]
    foreground: bool,

    /// Lock/pid file path (overrides the config file)
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// File receiving stdout/stderr after detaching (overrides the config file)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(pid_file) = cli.pid_file {
        config.pid_file = pid_file;
    }
    if let Some(log_file) = cli.log_file {
        config.log_file = Some(log_file);
    }

    if !cli.foreground {
        detach(&config).context("daemonizing")?;
    }

    // Only the detached child (or a foreground run) gets past this point.
    let _lock = match InstanceLock::try_acquire(&config.pid_file)
        .context("acquiring instance lock")?
    {
        LockOutcome::Acquired(lock) => lock,
        LockOutcome::Contended => {
            match read_recorded_pid(&config.pid_file) {
                Ok(pid) => eprintln!("duskd is already running (pid {})", pid),
                Err(_) => eprintln!("duskd is already running"),
            }
            // The single-instance goal is met; nothing went wrong.
            std::process::exit(0)
        }
    };

    init_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;

    info!(
        pid = std::process::id(),
        pid_file = %config.pid_file.display(),
        "duskd started"
    );

    runtime.block_on(wait_for_shutdown())?;

    info!("duskd stopped");

    Ok(())
}

/// Fork into the background, pointing stdout/stderr at the configured log
/// file (or /dev/null), and exit the parent.
fn detach(config: &DaemonConfig) -> anyhow::Result<()> {
    let target = match &config.log_file {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?,
        None => dev_null().context("opening /dev/null")?,
    };

    let mut daemonizer = Daemonizer::new(target);
    if let Some(dir) = &config.working_dir {
        daemonizer = daemonizer.working_directory(dir);
    }
    if let Some(mask) = config.umask {
        daemonizer = daemonizer.umask(mask);
    }

    match daemonizer.daemonize()? {
        ForkOutcome::Parent { .. } => std::process::exit(0),
        ForkOutcome::Child { .. } => Ok(()),
    }
}

/// Structured logging to stderr, which by now points wherever the daemon's
/// streams were redirected.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Park until SIGTERM or SIGINT.
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("received SIGINT");
        }
    }

    Ok(())
}
