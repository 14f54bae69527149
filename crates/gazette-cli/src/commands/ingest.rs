use anyhow::Result;

use gazette_core::{
    ipc::is_daemon_running, storage::Database, AppConfig, BatchReport, DaemonClient, Orchestrator,
    TriggerOutcome,
};

/// Trigger a batch through the daemon when it is up, otherwise run one in-process
pub async fn run(config: &AppConfig) -> Result<()> {
    let socket_path = config.socket_path();

    let outcome = if is_daemon_running(&socket_path).await {
        println!("Asking daemon to ingest...\n");
        DaemonClient::new(socket_path).run_ingest().await?
    } else {
        println!("Ingesting {} sources...\n", config.source_descriptors()?.len());
        let db = Database::new(config).await?;
        let orchestrator = Orchestrator::from_config(config, db.clone())?;
        let outcome = orchestrator.trigger().await;
        db.close().await;
        outcome?
    };

    match outcome {
        TriggerOutcome::Completed(report) => print_report(&report),
        TriggerOutcome::AlreadyRunning => {
            println!("A batch is already running; its results will be stored when it finishes.")
        }
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    for source in &report.per_source {
        match source.error {
            Some(ref err) => println!("  {} - FAILED: {}", source.source, err.cause),
            None => println!(
                "  {} - fetched {}, new {}, duplicate {}, refreshed {}, discarded {}, errors {}",
                source.source,
                source.fetched,
                source.inserted,
                source.skipped,
                source.refreshed,
                source.discarded,
                source.failed
            ),
        }
        for err in &source.persist_errors {
            println!("      {}", err);
        }
    }

    println!("\n{}", report.summary());
}
