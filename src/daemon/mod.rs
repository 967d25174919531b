// Daemon module - fork/detach sequence and session management

pub mod daemonize;
pub mod session;

pub use daemonize::{dev_null, Daemonizer, ForkOutcome};
pub use session::new_session;
