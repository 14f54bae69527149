//! Batch ingestion: fetch every source concurrently, normalize, persist, report.

mod gateway;
mod orchestrator;
mod report;

pub use gateway::{ArticleGateway, PersistError, SqliteGateway};
pub use orchestrator::{Orchestrator, TriggerOutcome};
pub use report::{BatchReport, BatchTotals, SourceReport};
