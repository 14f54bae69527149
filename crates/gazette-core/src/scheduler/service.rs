use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::ingest::{BatchReport, Orchestrator, TriggerOutcome};

/// Events emitted after each scheduler-initiated trigger
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A batch ran to completion
    BatchCompleted(BatchReport),
    /// The trigger was coalesced into a batch that was already running
    Skipped,
    /// The batch could not run at all
    Failed { message: String },
}

/// Drives the orchestrator at startup and on a fixed interval
pub struct SchedulerService {
    orchestrator: Arc<Orchestrator>,
    interval: Option<Duration>,
    run_on_start: bool,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl SchedulerService {
    pub fn new(orchestrator: Arc<Orchestrator>, sync: &SyncConfig) -> Self {
        let interval = match sync.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            orchestrator,
            interval,
            run_on_start: sync.run_on_start,
            event_tx: None,
        }
    }

    /// Set the event sender for batch notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                debug!("Scheduler event dropped: receiver gone");
            }
        }
    }

    /// Run until the shutdown flag flips to true (or its sender is dropped).
    ///
    /// A batch in flight when shutdown arrives is cancelled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.run_on_start {
            tokio::select! {
                _ = self.trigger("startup") => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Scheduler received shutdown signal");
                    return;
                }
            }
        }

        let Some(period) = self.interval else {
            info!("Recurring ingestion disabled (refresh_interval_secs = 0)");
            wait_for_shutdown(&mut shutdown).await;
            return;
        };

        info!("Scheduler started: ingesting every {}s", period.as_secs());

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        // A batch that overruns the period swallows the ticks it covered
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.trigger("scheduled") => {}
                        _ = wait_for_shutdown(&mut shutdown) => {
                            info!("Scheduler received shutdown signal during a batch");
                            break;
                        }
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    async fn trigger(&self, reason: &str) {
        debug!("Running {} ingestion", reason);
        match self.orchestrator.trigger().await {
            Ok(TriggerOutcome::Completed(report)) => {
                self.send_event(SchedulerEvent::BatchCompleted(report));
            }
            Ok(TriggerOutcome::AlreadyRunning) => {
                warn!("Skipping {} ingestion: a batch is already running", reason);
                self.send_event(SchedulerEvent::Skipped);
            }
            Err(e) => {
                error!("{} ingestion failed: {}", reason, e);
                self.send_event(SchedulerEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Resolve once the shutdown flag is set or its sender is dropped
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // Err means every sender is gone, which is as final as an explicit signal
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    use super::*;
    use crate::feed::{FeedClient, FetchError, NewArticle, RawEntry, SourceDescriptor};
    use crate::ingest::{ArticleGateway, PersistError};
    use crate::storage::UpsertOutcome;
    use crate::{Error, Result};

    struct OneEntryClient;

    #[async_trait]
    impl FeedClient for OneEntryClient {
        async fn fetch(&self, source: &SourceDescriptor) -> std::result::Result<Vec<RawEntry>, FetchError> {
            Ok(vec![RawEntry {
                title: Some("Hello".to_string()),
                link: Some(format!("{}/hello", source.feed_url)),
                ..Default::default()
            }])
        }
    }

    struct GatedClient {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl FeedClient for GatedClient {
        async fn fetch(&self, _source: &SourceDescriptor) -> std::result::Result<Vec<RawEntry>, FetchError> {
            self.gate.notified().await;
            Ok(Vec::new())
        }
    }

    /// Link set standing in for the article table
    #[derive(Default)]
    struct MemoryGateway {
        links: Mutex<HashSet<String>>,
        unavailable: bool,
    }

    #[async_trait]
    impl ArticleGateway for MemoryGateway {
        async fn ensure_available(&self) -> Result<()> {
            if self.unavailable {
                return Err(Error::StoreUnavailable("offline".to_string()));
            }
            Ok(())
        }

        async fn upsert(&self, article: &NewArticle) -> std::result::Result<UpsertOutcome, PersistError> {
            if self.links.lock().unwrap().insert(article.link.clone()) {
                Ok(UpsertOutcome::Inserted)
            } else {
                Ok(UpsertOutcome::Skipped)
            }
        }
    }

    fn sync_config(interval: u64, run_on_start: bool) -> SyncConfig {
        SyncConfig {
            refresh_interval_secs: interval,
            run_on_start,
            ..Default::default()
        }
    }

    fn orchestrator(client: Arc<dyn FeedClient>, gateway: MemoryGateway) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            client,
            Arc::new(gateway),
            vec![SourceDescriptor::new("A", "https://a.example")],
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_then_interval() {
        let orch = orchestrator(Arc::new(OneEntryClient), MemoryGateway::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = SchedulerService::new(orch, &sync_config(60, true)).with_event_sender(event_tx);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        match event_rx.recv().await.unwrap() {
            SchedulerEvent::BatchCompleted(report) => assert_eq!(report.totals().inserted, 1),
            other => panic!("unexpected event: {:?}", other),
        }

        // The paused clock jumps straight to the next tick
        match event_rx.recv().await.unwrap() {
            SchedulerEvent::BatchCompleted(report) => {
                assert_eq!(report.totals().inserted, 0);
                assert_eq!(report.totals().skipped, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_interval_waits_for_shutdown() {
        let orch = orchestrator(Arc::new(OneEntryClient), MemoryGateway::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = SchedulerService::new(orch, &sync_config(0, false)).with_event_sender(event_tx);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(event_rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_running_batch_is_skipped() {
        let gate = Arc::new(Notify::new());
        let orch = orchestrator(Arc::new(GatedClient { gate: gate.clone() }), MemoryGateway::default());

        let manual = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.trigger().await })
        };
        while !orch.is_running() {
            tokio::task::yield_now().await;
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler =
            SchedulerService::new(orch.clone(), &sync_config(0, true)).with_event_sender(event_tx);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        assert!(matches!(event_rx.recv().await.unwrap(), SchedulerEvent::Skipped));

        gate.notify_one();
        assert!(matches!(
            manual.await.unwrap().unwrap(),
            TriggerOutcome::Completed(_)
        ));

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_store_reports_failure() {
        let gateway = MemoryGateway {
            unavailable: true,
            ..Default::default()
        };
        let orch = orchestrator(Arc::new(OneEntryClient), gateway);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = SchedulerService::new(orch, &sync_config(0, true)).with_event_sender(event_tx);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        match event_rx.recv().await.unwrap() {
            SchedulerEvent::Failed { message } => assert!(message.contains("offline")),
            other => panic!("unexpected event: {:?}", other),
        }

        drop(shutdown_tx);
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
