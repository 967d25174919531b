//! Minimal Unix daemonization: detach from the controlling terminal, redirect
//! the standard streams, and enforce single-instance execution with an
//! advisory file lock that doubles as a PID record.
//!
//! ```no_run
//! use dusk::daemon::{dev_null, Daemonizer, ForkOutcome};
//! use dusk::lock::{InstanceLock, LockOutcome};
//!
//! fn main() -> dusk::error::Result<()> {
//!     match Daemonizer::new(dev_null()?).daemonize()? {
//!         ForkOutcome::Parent { .. } => std::process::exit(0),
//!         ForkOutcome::Child { .. } => {}
//!     }
//!
//!     let _lock = match InstanceLock::try_acquire("/tmp/myapp.pid")? {
//!         LockOutcome::Acquired(lock) => lock,
//!         LockOutcome::Contended => std::process::exit(0),
//!     };
//!
//!     // daemon body; the lock is held until the process exits
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("dusk relies on fork/setsid/advisory file locks and only builds on Unix");

pub mod classic;
pub mod config;
pub mod daemon;
pub mod error;
pub mod lock;
