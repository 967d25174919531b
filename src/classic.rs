//! Traditional daemon bootstrap with terminate-on-outcome control flow.
//!
//! The outcome-based API hands every branch back to the caller. Call sites
//! that want the historical shape instead, where the parent of the fork
//! never returns and an already-running instance quietly wins, use these
//! wrappers. Exit codes, for supervisors and boot scripts that inspect them:
//!
//! | condition                          | behavior  |
//! |------------------------------------|-----------|
//! | fork succeeded, this is the parent | `exit(0)` |
//! | fork failed                        | `exit(1)` |
//! | lock file cannot be opened/locked  | `exit(1)` |
//! | lock held by another instance      | `exit(0)` |
//!
//! Contention exiting with status 0 is deliberate: "an instance is already
//! running" means the single-instance goal is met, which is success as far
//! as a boot script is concerned. Programs that need to tell the cases
//! apart use [`InstanceLock::try_acquire`](crate::lock::InstanceLock::try_acquire),
//! which reports contention as data.

use std::os::unix::io::RawFd;
use std::path::Path;

use nix::libc;
use nix::unistd::Pid;

use crate::daemon::{session, Daemonizer, ForkOutcome};
use crate::error::{DuskError, Result};
use crate::lock::{InstanceLock, LockOutcome};

/// Fork into the background over a raw descriptor, terminating the parent.
///
/// Returns only in the detached child, with its pid. An unusable descriptor
/// is reported as an error before anything forks, so the caller is still
/// around to see it.
pub fn start(fd: RawFd) -> Result<Pid> {
    let daemonizer = Daemonizer::with_raw_fd(fd)?;
    match daemonizer.daemonize() {
        Ok(ForkOutcome::Parent { .. }) => std::process::exit(0),
        Ok(ForkOutcome::Child { pid, .. }) => Ok(pid),
        Err(DuskError::ForkFailed(_)) => std::process::exit(1),
        // Redirect or setsid failures leave no usable daemon behind either.
        Err(_) => std::process::exit(1),
    }
}

/// Take the single-instance lock on `path`, recording the pid on success.
///
/// `false` means the path itself was unusable and nothing was touched.
/// `true` means the lock is held; its descriptor is intentionally leaked so
/// the lock lives exactly as long as the process. Contention and open
/// failures terminate the process per the module table.
pub fn lock(path: impl AsRef<Path>) -> bool {
    match InstanceLock::try_acquire(path) {
        Ok(LockOutcome::Acquired(held)) => {
            // Dropping the value would release the lock; leak it instead so
            // only process exit lets go.
            std::mem::forget(held);
            true
        }
        Ok(LockOutcome::Contended) => std::process::exit(0),
        Err(DuskError::InvalidLockPath(_)) => false,
        Err(_) => std::process::exit(1),
    }
}

/// Raw `setsid(2)`: the new session id, or `-1` if the kernel refused.
pub fn set_sid() -> libc::pid_t {
    match session::new_session() {
        Ok(sid) => sid.as_raw(),
        Err(_) => -1,
    }
}
