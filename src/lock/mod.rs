// Lock module - single-instance enforcement via advisory file locks

pub mod backend;
pub mod instance;

pub use backend::{FcntlLock, LockAttempt, LockBackend};
pub use instance::{process_alive, read_recorded_pid, InstanceLock, LockOutcome};
