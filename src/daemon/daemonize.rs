// Daemonization support for Unix systems

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

use nix::errno::Errno;
use nix::libc;
use nix::sys::stat::{umask, Mode};
use nix::unistd::{fork, getpid, ForkResult, Pid};
use tracing::debug;

use crate::daemon::session::new_session;
use crate::error::{DuskError, Result};

/// Which side of a successful fork the caller is running on.
///
/// Both sides are reported as plain data; neither branch exits the process.
/// The conventional parent move is `std::process::exit(0)`, but supervisors
/// that want to wait on the child, retry, or log first get to do so. The
/// [`classic::start`](crate::classic::start) wrapper restores the historical
/// exit-the-parent behavior for callers that want it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    /// The original process. The child is already running detached.
    Parent { child: Pid },
    /// The daemonized child: stdin closed, stdout/stderr rewired, leader of
    /// a fresh session.
    Child { pid: Pid, session: Pid },
}

impl ForkOutcome {
    pub fn is_parent(&self) -> bool {
        matches!(self, ForkOutcome::Parent { .. })
    }

    pub fn is_child(&self) -> bool {
        matches!(self, ForkOutcome::Child { .. })
    }
}

/// Destination for the daemon's stdout and stderr.
#[derive(Debug)]
enum RedirectTarget {
    /// Descriptor owned by the daemonizer, closed once rewiring is done.
    Owned(OwnedFd),
    /// Borrowed descriptor; the caller keeps responsibility for it.
    Raw(RawFd),
}

impl RedirectTarget {
    fn raw(&self) -> RawFd {
        match self {
            RedirectTarget::Owned(fd) => fd.as_raw_fd(),
            RedirectTarget::Raw(fd) => *fd,
        }
    }
}

/// Builder for the fork-and-detach sequence.
///
/// The child ends up with stdin closed, stdout and stderr pointing at the
/// redirect target, and a session of its own. Forking is deferred until
/// [`daemonize`](Daemonizer::daemonize) so the builder can be configured and
/// validated first.
///
/// ```no_run
/// use dusk::daemon::{dev_null, Daemonizer, ForkOutcome};
///
/// # fn main() -> dusk::error::Result<()> {
/// match Daemonizer::new(dev_null()?).daemonize()? {
///     ForkOutcome::Parent { .. } => std::process::exit(0),
///     ForkOutcome::Child { pid, .. } => {
///         // daemon work starts here
///         let _ = pid;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Daemonizer {
    target: RedirectTarget,
    after_fork: Option<Box<dyn FnOnce()>>,
    working_dir: Option<PathBuf>,
    umask_bits: Option<u32>,
}

impl Daemonizer {
    /// Daemonizer that redirects stdout/stderr to `target`, taking ownership
    /// of the descriptor. It is closed in the child once the standard streams
    /// point at it.
    pub fn new(target: impl Into<OwnedFd>) -> Self {
        Daemonizer {
            target: RedirectTarget::Owned(target.into()),
            after_fork: None,
            working_dir: None,
            umask_bits: None,
        }
    }

    /// Daemonizer over a borrowed raw descriptor.
    ///
    /// The descriptor is validated up front so an unusable one is reported
    /// before anything forks. It is left open after rewiring; the caller
    /// still owns it.
    pub fn with_raw_fd(fd: RawFd) -> Result<Self> {
        // F_GETFD is the cheapest "is this descriptor open" probe.
        if fd < 0 || unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
            return Err(DuskError::InvalidRedirect(fd));
        }
        Ok(Daemonizer {
            target: RedirectTarget::Raw(fd),
            after_fork: None,
            working_dir: None,
            umask_bits: None,
        })
    }

    /// Hook run in the child immediately after the fork, before any stream
    /// is touched. The place to reset fork-sensitive state such as an event
    /// loop or a PRNG keyed to the parent's pid.
    pub fn after_fork<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.after_fork = Some(Box::new(hook));
        self
    }

    /// Change the child's working directory after detaching.
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// File-mode creation mask applied in the child, e.g. `0o027`.
    pub fn umask(mut self, mask: u32) -> Self {
        self.umask_bits = Some(mask);
        self
    }

    /// Fork and, in the child, run the detach sequence.
    ///
    /// Returns [`ForkOutcome::Parent`] in the original process and
    /// [`ForkOutcome::Child`] in the daemonized one; a failed `fork(2)` is
    /// an error in the only process that exists to see it.
    pub fn daemonize(self) -> Result<ForkOutcome> {
        let Daemonizer {
            target,
            after_fork,
            working_dir,
            umask_bits,
        } = self;

        match unsafe { fork() }.map_err(DuskError::ForkFailed)? {
            ForkResult::Parent { child } => Ok(ForkOutcome::Parent { child }),
            ForkResult::Child => detach_child(target, after_fork, working_dir, umask_bits),
        }
    }
}

/// Detach sequence run in the freshly forked child.
fn detach_child(
    target: RedirectTarget,
    after_fork: Option<Box<dyn FnOnce()>>,
    working_dir: Option<PathBuf>,
    umask_bits: Option<u32>,
) -> Result<ForkOutcome> {
    // Fork-sensitive caller state must be reset before any descriptor moves.
    if let Some(hook) = after_fork {
        hook();
    }

    // A daemon has nothing to read; EBADF just means stdin was already gone.
    if unsafe { libc::close(libc::STDIN_FILENO) } < 0 {
        let errno = Errno::last();
        if errno != Errno::EBADF {
            return Err(DuskError::Redirect(errno));
        }
    }

    // Redirect standard output and error to the target
    let fd = target.raw();
    for std_fd in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, std_fd) } < 0 {
            return Err(DuskError::Redirect(Errno::last()));
        }
    }

    // Last step of the detach proper: a fork child is never a group leader,
    // so this cannot fail with EPERM here.
    let session = new_session()?;

    if let Some(mask) = umask_bits {
        umask(Mode::from_bits_truncate(mask as libc::mode_t));
    }

    if let Some(dir) = working_dir {
        std::env::set_current_dir(&dir).map_err(|e| DuskError::Chdir {
            path: dir,
            source: e,
        })?;
    }

    // An owned target has served its purpose once both streams point at it.
    drop(target);

    let pid = getpid();
    debug!(%pid, %session, "process detached into background");
    Ok(ForkOutcome::Child { pid, session })
}

/// Open `/dev/null` read-write for use as a redirect target.
pub fn dev_null() -> Result<File> {
    let file = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    Ok(file)
}
