use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gazette_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "gazette")]
#[command(author, version, about = "Scheduled multi-source article aggregator")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Background daemon: scheduled ingestion plus the IPC read surface
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Run one ingestion batch now and print the per-source breakdown
    Ingest,
    /// List stored articles, newest first
    List {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        /// Only articles whose title or description contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show a single article
    Show {
        id: i64,
    },
    /// Print the configured sources
    Sources,
    /// Print the article count
    Health,
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon in the foreground
    Start,
    /// Stop a running daemon
    Stop,
    /// Check daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Daemon { action } => match action {
            DaemonAction::Start => commands::daemon::start(config).await,
            DaemonAction::Stop => commands::daemon::stop(&config).await,
            DaemonAction::Status => commands::daemon::status(&config).await,
        },
        Commands::Ingest => commands::ingest::run(&config).await,
        Commands::List {
            page,
            limit,
            search,
        } => commands::list::run(&config, page, limit, search).await,
        Commands::Show { id } => commands::show::run(&config, id).await,
        Commands::Sources => commands::sources::run(&config),
        Commands::Health => commands::health::run(&config).await,
    }
}
