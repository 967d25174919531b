// Single-instance enforcement: an exclusive lock file carrying the holder's pid

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{DuskError, Result};
use crate::lock::backend::{FcntlLock, LockAttempt, LockBackend};

/// Longest pid record ever written: ten decimal digits (u32::MAX).
const PID_RECORD_MAX: usize = 10;

/// Outcome of an instance-lock attempt.
///
/// Contention is data, not an error: "another instance is already running"
/// is an expected answer, and the embedder decides what to do about it. The
/// [`classic`](crate::classic) entry points translate it into the historical
/// quiet exit with status 0.
#[derive(Debug)]
pub enum LockOutcome {
    /// The lock is held. Keep the value alive for as long as this process
    /// should count as the running instance.
    Acquired(InstanceLock),
    /// A live process already holds the lock on this path.
    Contended,
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }

    pub fn is_contended(&self) -> bool {
        matches!(self, LockOutcome::Contended)
    }
}

/// An exclusive advisory lock on a path, with the holder's pid recorded in
/// the file.
///
/// The descriptor stays open for the lifetime of this value. Dropping it, or
/// process exit however it happens, releases the lock; there is no explicit
/// unlock. The file itself is left behind as an inspection artifact, so
/// `cat <path>` answers "which pid had it last".
///
/// POSIX record locks do not exclude their owner: a second acquisition of
/// the same path from the holding process succeeds, and closing any
/// descriptor the process has on the file drops the lock early. Acquire
/// once, at startup, and hold on to the value.
#[derive(Debug)]
pub struct InstanceLock {
    #[allow(dead_code)] // held for the lock, never read again
    file: File,
    path: PathBuf,
    pid: u32,
}

impl InstanceLock {
    /// Attempt the lock with the default [`FcntlLock`] backend.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<LockOutcome> {
        Self::try_acquire_with(&FcntlLock, path)
    }

    /// Attempt the lock with a caller-supplied backend.
    ///
    /// On success the current pid is written into the file as a decimal
    /// string at offset zero, replacing whatever a previous holder left. The
    /// write is best-effort: a failure is logged and the lock kept, since an
    /// unlabelled lock still excludes other instances.
    pub fn try_acquire_with<B: LockBackend>(
        backend: &B,
        path: impl AsRef<Path>,
    ) -> Result<LockOutcome> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DuskError::InvalidLockPath(path.to_path_buf()));
        }

        match backend.try_acquire_exclusive(path)? {
            LockAttempt::Contended => {
                debug!(path = %path.display(), "instance lock contended");
                Ok(LockOutcome::Contended)
            }
            LockAttempt::Held(mut file) => {
                let pid = std::process::id();
                if let Err(e) = write_pid_record(&mut file, pid) {
                    warn!(path = %path.display(), error = %e, "failed to record pid in lock file");
                }
                debug!(path = %path.display(), pid, "instance lock acquired");
                Ok(LockOutcome::Acquired(InstanceLock {
                    file,
                    path: path.to_path_buf(),
                    pid,
                }))
            }
        }
    }

    /// Pid recorded in the lock file (the current process).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate and write the pid at offset zero. A freshly opened descriptor is
/// still positioned there.
fn write_pid_record(file: &mut File, pid: u32) -> std::io::Result<()> {
    let record = pid.to_string();
    debug_assert!(record.len() <= PID_RECORD_MAX);
    file.set_len(0)?;
    file.write_all(record.as_bytes())?;
    Ok(())
}

/// Read the pid recorded at `path` by a current or former lock holder.
pub fn read_recorded_pid(path: impl AsRef<Path>) -> Result<u32> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| DuskError::PidRecord {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    contents
        .trim()
        .parse::<u32>()
        .map_err(|e| DuskError::PidRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Whether a process with the given pid is alive, probed with the null
/// signal. EPERM still counts as alive: the process exists, it just belongs
/// to somebody else.
pub fn process_alive(pid: u32) -> bool {
    let raw = pid as i32;
    // Zero and negative values address whole process groups, never one pid.
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false, // No such process
        Err(Errno::EPERM) => true,  // Exists, just belongs to somebody else
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn acquire(path: &Path) -> InstanceLock {
        match InstanceLock::try_acquire(path).unwrap() {
            LockOutcome::Acquired(lock) => lock,
            LockOutcome::Contended => panic!("Fresh path reported contended"),
        }
    }

    #[test]
    fn test_acquires_and_records_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instance.pid");

        let lock = acquire(&path);
        assert_eq!(lock.pid(), std::process::id());
        assert_eq!(lock.path(), path.as_path());

        // Exact record: decimal digits, no trailing newline.
        let recorded = std::fs::read_to_string(&path).unwrap();
        assert_eq!(recorded, std::process::id().to_string());
    }

    #[test]
    fn test_empty_path_is_usage_error() {
        match InstanceLock::try_acquire("") {
            Err(DuskError::InvalidLockPath(_)) => {}
            _ => panic!("Expected InvalidLockPath"),
        }
    }

    #[test]
    fn test_stale_record_replaced_on_acquire() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instance.pid");
        std::fs::write(&path, "999999999\n").unwrap();

        let _lock = acquire(&path);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_file_survives_release_for_inspection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instance.pid");

        let lock = acquire(&path);
        drop(lock);
        assert!(path.exists());
        assert_eq!(read_recorded_pid(&path).unwrap(), std::process::id());
    }

    #[test]
    fn test_read_recorded_pid_tolerates_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instance.pid");
        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_recorded_pid(&path).unwrap(), 4242);
    }

    #[test]
    fn test_read_recorded_pid_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instance.pid");
        std::fs::write(&path, "not a pid").unwrap();
        assert!(matches!(
            read_recorded_pid(&path),
            Err(DuskError::PidRecord { .. })
        ));
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        assert!(!process_alive(0));
    }

    #[test]
    fn test_init_counts_as_alive_even_without_permission() {
        // kill(1, 0) is EPERM for unprivileged callers; still a live process.
        assert!(process_alive(1));
    }
}
