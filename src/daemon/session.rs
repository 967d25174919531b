// Session management - standalone setsid wrapper

use nix::errno::Errno;
use nix::unistd::{setsid, Pid};

use crate::error::{DuskError, Result};

/// Create a new session with the calling process as its leader, detaching
/// it from any controlling terminal.
///
/// Thin wrapper over `setsid(2)` for callers that manage forking themselves.
/// The kernel refuses when the caller already leads a process group (a fresh
/// fork child never does), which surfaces as
/// [`DuskError::AlreadySessionLeader`]. Used internally by
/// [`Daemonizer`](crate::daemon::Daemonizer) as part of the detach sequence.
pub fn new_session() -> Result<Pid> {
    setsid().map_err(|e| match e {
        Errno::EPERM => DuskError::AlreadySessionLeader,
        other => DuskError::SessionCreate(other),
    })
}
