//! Unix socket IPC between the daemon and the command line.
//!
//! Carries the manual ingestion trigger and the article read surface.

mod client;
mod protocol;
mod server;

pub use client::{is_daemon_running, DaemonClient};
pub use protocol::*;
pub use server::DaemonServer;
