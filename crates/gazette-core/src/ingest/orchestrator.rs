use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::gateway::{ArticleGateway, SqliteGateway};
use super::report::{BatchReport, SourceReport};
use crate::config::AppConfig;
use crate::feed::{normalize, FeedClient, FetchCause, FetchError, HttpFeedClient, SourceDescriptor};
use crate::storage::Database;
use crate::{Error, Result};

/// Result of asking the orchestrator to start a batch
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Completed(BatchReport),
    /// Another batch held the run-lock; nothing was started
    AlreadyRunning,
}

/// Runs ingestion batches across the configured sources.
///
/// At most one batch runs at a time. Every caller (startup, timer, manual)
/// goes through [`Orchestrator::trigger`]; a trigger that arrives while a batch
/// is in flight is coalesced into it rather than queued. Dropping a running
/// trigger aborts its source tasks, and the lock is only released once every
/// one of them has stopped.
pub struct Orchestrator {
    client: Arc<dyn FeedClient>,
    gateway: Arc<dyn ArticleGateway>,
    sources: Arc<Vec<SourceDescriptor>>,
    running: Arc<AtomicBool>,
    last_report: RwLock<Option<BatchReport>>,
}

/// Releases the run-lock when the last holder drops it.
///
/// The trigger and every source task hold a clone, so the lock outlives a
/// cancelled trigger until its tasks have been torn down.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Per-source tasks of one batch, aborted if the batch is dropped early
struct SourceTasks(Vec<(String, JoinHandle<SourceReport>)>);

impl Drop for SourceTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn FeedClient>,
        gateway: Arc<dyn ArticleGateway>,
        sources: Vec<SourceDescriptor>,
    ) -> Self {
        Self {
            client,
            gateway,
            sources: Arc::new(sources),
            running: Arc::new(AtomicBool::new(false)),
            last_report: RwLock::new(None),
        }
    }

    /// Wire the HTTP feed client and SQLite gateway from configuration
    pub fn from_config(config: &AppConfig, db: Database) -> Result<Self> {
        let client = HttpFeedClient::new(config)?;
        let gateway = SqliteGateway::new(db, config.sync.on_duplicate);
        let sources = config.source_descriptors()?;

        Ok(Self::new(Arc::new(client), Arc::new(gateway), sources))
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Report of the most recent completed batch
    pub async fn last_report(&self) -> Option<BatchReport> {
        self.last_report.read().await.clone()
    }

    fn try_lock(&self) -> Option<Arc<RunGuard>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                Arc::new(RunGuard {
                    flag: Arc::clone(&self.running),
                })
            })
    }

    /// Start a batch unless one is already running.
    ///
    /// Returns `Err` only when the article store is unreachable; per-source and
    /// per-entry failures are carried in the report.
    pub async fn trigger(&self) -> Result<TriggerOutcome> {
        let Some(guard) = self.try_lock() else {
            info!("Ingestion batch already running, trigger coalesced");
            return Ok(TriggerOutcome::AlreadyRunning);
        };

        let report = self.run_batch(&guard).await?;
        Ok(TriggerOutcome::Completed(report))
    }

    /// Run one batch and wait for it, failing with `Error::BatchInProgress` if one is in flight
    pub async fn run(&self) -> Result<BatchReport> {
        match self.trigger().await? {
            TriggerOutcome::Completed(report) => Ok(report),
            TriggerOutcome::AlreadyRunning => Err(Error::BatchInProgress),
        }
    }

    async fn run_batch(&self, guard: &Arc<RunGuard>) -> Result<BatchReport> {
        let started_at = Utc::now();

        if let Err(e) = self.gateway.ensure_available().await {
            error!("Ingestion batch aborted: {}", e);
            return Err(e);
        }

        info!("Starting ingestion batch across {} sources", self.sources.len());

        let mut tasks = SourceTasks(
            self.sources
                .iter()
                .cloned()
                .map(|source| {
                    let name = source.name.clone();
                    let client = Arc::clone(&self.client);
                    let gateway = Arc::clone(&self.gateway);
                    let guard = Arc::clone(guard);
                    let handle = tokio::spawn(async move {
                        let _lock = guard;
                        ingest_source(client.as_ref(), gateway.as_ref(), &source).await
                    });
                    (name, handle)
                })
                .collect(),
        );

        let mut per_source = Vec::with_capacity(tasks.0.len());
        for (name, handle) in tasks.0.iter_mut() {
            match handle.await {
                Ok(report) => per_source.push(report),
                Err(e) => {
                    error!(source = %name, "Ingestion task failed: {}", e);
                    per_source.push(SourceReport::fetch_failed(FetchError {
                        source: name.clone(),
                        cause: FetchCause::TaskFailed(e.to_string()),
                    }));
                }
            }
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            per_source,
        };

        info!("Ingestion batch finished: {}", report.summary());
        *self.last_report.write().await = Some(report.clone());

        Ok(report)
    }
}

/// Fetch, normalize and persist one source. Never fails fast: every entry is attempted.
async fn ingest_source(
    client: &dyn FeedClient,
    gateway: &dyn ArticleGateway,
    source: &SourceDescriptor,
) -> SourceReport {
    let entries = match client.fetch(source).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(source = %source.name, "Fetch failed: {}", e.cause);
            return SourceReport::fetch_failed(e);
        }
    };

    let ingested_at = Utc::now();
    let mut report = SourceReport::new(&source.name);
    report.fetched = entries.len();

    for raw in entries {
        let article = match normalize(raw, source, ingested_at) {
            Ok(article) => article,
            Err(skip) => {
                warn!(source = %source.name, "Discarding entry: {}", skip);
                report.record_discard();
                continue;
            }
        };

        match gateway.upsert(&article).await {
            Ok(outcome) => {
                debug!(source = %source.name, link = %article.link, ?outcome, "Article written");
                report.record(outcome);
            }
            Err(e) => {
                error!(source = %source.name, link = %e.link, "Persist failed: {}", e.message);
                report.record_failure(e);
            }
        }
    }

    info!(
        source = %source.name,
        fetched = report.fetched,
        inserted = report.inserted,
        skipped = report.skipped,
        refreshed = report.refreshed,
        discarded = report.discarded,
        failed = report.failed,
        "Source ingested"
    );

    report
}
