// Advisory lock backends

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::errno::Errno;
use nix::libc;

use crate::error::{DuskError, Result};

/// Result of one lock attempt against a path.
#[derive(Debug)]
pub enum LockAttempt {
    /// The returned descriptor holds an exclusive advisory lock covering the
    /// whole file. The lock lives as long as the descriptor stays open.
    Held(File),
    /// Another process holds the lock.
    Contended,
}

/// Capability interface for exclusive, non-blocking advisory locks.
///
/// [`FcntlLock`] is the backend used in production; swapping in a different
/// primitive, or a fake that never touches the filesystem, only requires
/// implementing this trait and handing it to
/// [`InstanceLock::try_acquire_with`](crate::lock::InstanceLock::try_acquire_with).
pub trait LockBackend {
    /// Open `path` (creating it if absent) and attempt an exclusive,
    /// non-blocking lock over the whole file.
    ///
    /// Existing contents must be preserved: a losing contender never gets to
    /// clobber the holder's record. Truncating is the caller's business once
    /// the lock is held.
    fn try_acquire_exclusive(&self, path: &Path) -> Result<LockAttempt>;
}

/// Default backend: POSIX record lock via `fcntl(F_SETLK)`, the same
/// primitive as `lockf(F_TLOCK)`.
///
/// Per-process semantics apply: a second acquisition from the process that
/// already holds the lock succeeds, and closing any descriptor the process
/// has on the file releases it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FcntlLock;

impl LockBackend for FcntlLock {
    fn try_acquire_exclusive(&self, path: &Path) -> Result<LockAttempt> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o640)
            .open(path)
            .map_err(|e| {
                if e.kind() == ErrorKind::InvalidInput {
                    // Paths the OS refuses to even look at (interior NUL and
                    // the like) are usage errors, not resource failures.
                    DuskError::InvalidLockPath(path.to_path_buf())
                } else {
                    DuskError::OpenLockFile {
                        path: path.to_path_buf(),
                        source: e,
                    }
                }
            })?;

        // Whole-file write lock: l_start = 0 with l_len = 0 covers every byte
        // the file will ever have.
        let mut region: libc::flock = unsafe { std::mem::zeroed() };
        region.l_type = libc::F_WRLCK as libc::c_short;
        region.l_whence = libc::SEEK_SET as libc::c_short;

        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &region) };
        if rc == -1 {
            return match Errno::last() {
                // POSIX allows either errno when somebody else holds the lock
                Errno::EACCES | Errno::EAGAIN => Ok(LockAttempt::Contended),
                errno => Err(DuskError::LockFile {
                    path: path.to_path_buf(),
                    source: errno,
                }),
            };
        }
        Ok(LockAttempt::Held(file))
    }
}
