use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gateway::PersistError;
use crate::feed::FetchError;
use crate::storage::UpsertOutcome;

/// Outcome of ingesting one source within a batch.
///
/// `fetched` always equals the sum of the per-entry outcomes:
/// `inserted + skipped + refreshed + discarded + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub inserted: usize,
    pub skipped: usize,
    #[serde(default)]
    pub refreshed: usize,
    pub discarded: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persist_errors: Vec<PersistError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
}

impl SourceReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Report for a source whose fetch failed; nothing was processed
    pub fn fetch_failed(error: FetchError) -> Self {
        Self {
            source: error.source.clone(),
            error: Some(error),
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
            UpsertOutcome::Refreshed => self.refreshed += 1,
        }
    }

    pub(crate) fn record_discard(&mut self) {
        self.discarded += 1;
    }

    pub(crate) fn record_failure(&mut self, error: PersistError) {
        self.failed += 1;
        self.persist_errors.push(error);
    }

    /// True when the fetch succeeded and every entry was handled without a write failure
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failed == 0
    }
}

/// Aggregated counters across all sources of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub sources: usize,
    pub failed_sources: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub refreshed: usize,
    pub discarded: usize,
    pub failed: usize,
}

/// Canonical record of one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub per_source: Vec<SourceReport>,
}

impl BatchReport {
    pub fn totals(&self) -> BatchTotals {
        self.per_source
            .iter()
            .fold(BatchTotals::default(), |mut totals, report| {
                totals.sources += 1;
                if report.error.is_some() {
                    totals.failed_sources += 1;
                }
                totals.fetched += report.fetched;
                totals.inserted += report.inserted;
                totals.skipped += report.skipped;
                totals.refreshed += report.refreshed;
                totals.discarded += report.discarded;
                totals.failed += report.failed;
                totals
            })
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.per_source.iter().find(|r| r.source == name)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// One-line summary for logs and status output
    pub fn summary(&self) -> String {
        let t = self.totals();
        format!(
            "{} sources ({} failed): {} fetched, {} new, {} duplicate, {} refreshed, {} discarded, {} write errors in {}ms",
            t.sources,
            t.failed_sources,
            t.fetched,
            t.inserted,
            t.skipped,
            t.refreshed,
            t.discarded,
            t.failed,
            self.duration_ms()
        )
    }
}
