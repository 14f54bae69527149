use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use gazette_core::{
    ipc::is_daemon_running as socket_alive,
    scheduler::{SchedulerEvent, SchedulerService},
    storage::Database,
    AppConfig, DaemonClient, DaemonServer, Orchestrator,
};

fn pid_file_path(config: &AppConfig) -> PathBuf {
    config.data_dir().join("gazette.pid")
}

/// PID of a live daemon, cleaning up a stale PID file
fn running_pid(config: &AppConfig) -> Option<u32> {
    let pid_path = pid_file_path(config);
    let contents = fs::read_to_string(&pid_path).ok()?;
    let pid: u32 = contents.trim().parse().ok()?;

    #[cfg(unix)]
    {
        use std::process::Command;
        let alive = Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if alive {
            return Some(pid);
        }
    }

    let _ = fs::remove_file(&pid_path);
    None
}

fn write_pid_file(config: &AppConfig) -> Result<()> {
    let pid_path = pid_file_path(config);
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&pid_path, format!("{}\n", std::process::id()))?;
    Ok(())
}

fn remove_pid_file(config: &AppConfig) {
    let _ = fs::remove_file(pid_file_path(config));
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Start the daemon in the foreground
pub async fn start(config: AppConfig) -> Result<()> {
    if let Some(pid) = running_pid(&config) {
        println!("Daemon is already running (PID: {})", pid);
        return Ok(());
    }

    let db = Database::new(&config).await?;
    let orchestrator = Arc::new(Orchestrator::from_config(&config, db.clone())?);

    write_pid_file(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = signal_tx.send(true);
    });

    // The IPC server comes up first so the startup batch never delays readiness
    let server = DaemonServer::new(db.clone(), orchestrator.clone(), &config);
    let server_rx = shutdown_rx.clone();
    let server_task = tokio::spawn(async move { server.run(server_rx).await });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SchedulerEvent::BatchCompleted(report) => {
                    for source in &report.per_source {
                        if let Some(ref err) = source.error {
                            warn!("Source '{}' failed this batch: {}", source.source, err.cause);
                        }
                    }
                }
                SchedulerEvent::Skipped => {}
                SchedulerEvent::Failed { message } => {
                    error!("Scheduled batch could not run: {}", message);
                }
            }
        }
    });

    let scheduler =
        SchedulerService::new(orchestrator.clone(), &config.sync).with_event_sender(event_tx);

    println!(
        "Daemon started (PID: {}). Press Ctrl+C or run 'gazette daemon stop' to stop.",
        std::process::id()
    );
    println!("  Sources: {}", orchestrator.sources().len());
    println!("  Refresh interval: {} seconds", config.sync.refresh_interval_secs);
    println!("  Socket: {}", config.socket_path().display());

    // Runs until shutdown
    scheduler.run(shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(Err(e)) => error!("IPC server error: {}", e),
        Err(e) => error!("IPC server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    db.close().await;
    remove_pid_file(&config);
    println!("Daemon stopped.");

    Ok(())
}

/// Stop the daemon
pub async fn stop(config: &AppConfig) -> Result<()> {
    let Some(pid) = running_pid(config) else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Stopping daemon (PID: {})...", pid);

    #[cfg(unix)]
    {
        use std::process::Command;
        let output = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .output()?;

        if !output.status.success() {
            println!("Failed to stop daemon. You may need to kill it manually: kill {}", pid);
            return Ok(());
        }

        // Give an in-flight batch a moment to be cancelled cleanly
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        if running_pid(config).is_none() {
            println!("Daemon stopped successfully.");
        } else {
            let _ = Command::new("kill").arg("-9").arg(pid.to_string()).output();
            remove_pid_file(config);
            let _ = fs::remove_file(config.socket_path());
            println!("Daemon forcefully terminated.");
        }
    }

    #[cfg(not(unix))]
    {
        println!("Please stop the daemon manually (PID: {})", pid);
    }

    Ok(())
}

/// Show daemon status
pub async fn status(config: &AppConfig) -> Result<()> {
    let Some(pid) = running_pid(config) else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Daemon is running (PID: {})", pid);
    println!("PID file: {}", pid_file_path(config).display());

    let socket_path = config.socket_path();
    if !socket_alive(&socket_path).await {
        println!("IPC socket is not responding: {}", socket_path.display());
        return Ok(());
    }

    let status = DaemonClient::new(socket_path).status().await?;
    println!("Uptime: {}s", status.uptime_secs);
    println!("Sources: {}", status.sources);
    println!("Ingesting now: {}", if status.ingesting { "yes" } else { "no" });
    match status.last_batch {
        Some(report) => println!(
            "Last batch at {}: {}",
            report.finished_at.format("%Y-%m-%d %H:%M:%S"),
            report.summary()
        ),
        None => println!("No batch has completed yet."),
    }

    Ok(())
}
