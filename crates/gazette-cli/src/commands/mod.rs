pub mod daemon;
pub mod health;
pub mod ingest;
pub mod list;
pub mod show;
pub mod sources;
