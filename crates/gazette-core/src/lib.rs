pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod ipc;
pub mod scheduler;
pub mod storage;

pub use config::{AppConfig, DuplicatePolicy};
pub use error::{Error, Result};
pub use ingest::{BatchReport, Orchestrator, SourceReport, TriggerOutcome};
pub use ipc::{DaemonClient, DaemonServer};
