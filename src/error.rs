use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the dusk daemonization library
#[derive(Debug, Error)]
pub enum DuskError {
    // Usage errors: reported synchronously, nothing is forked or touched
    #[error("Invalid redirect descriptor: {0}")]
    InvalidRedirect(std::os::unix::io::RawFd),

    #[error("Invalid lock file path: {0:?}")]
    InvalidLockPath(PathBuf),

    // Daemonization errors
    #[error("Fork failed: {0}")]
    ForkFailed(nix::errno::Errno),

    #[error("Failed to redirect standard streams: {0}")]
    Redirect(nix::errno::Errno),

    #[error("Failed to create new session: {0}")]
    SessionCreate(nix::errno::Errno),

    #[error("Calling process is already a session leader")]
    AlreadySessionLeader,

    #[error("Failed to change working directory to {path}: {source}")]
    Chdir {
        path: PathBuf,
        source: std::io::Error,
    },

    // Lock errors
    #[error("Failed to open lock file {path}: {source}")]
    OpenLockFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to apply advisory lock on {path}: {source}")]
    LockFile {
        path: PathBuf,
        source: nix::errno::Errno,
    },

    #[error("Unreadable pid record in {path}: {reason}")]
    PidRecord { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dusk operations
pub type Result<T> = std::result::Result<T, DuskError>;
