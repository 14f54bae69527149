use anyhow::Result;
use chrono::Utc;

use gazette_core::{
    ipc::{is_daemon_running, HealthResponse},
    storage::{ArticleRepository, Database},
    AppConfig, DaemonClient,
};

/// Ask the daemon when it is up, otherwise read the article store directly
pub async fn run(config: &AppConfig) -> Result<()> {
    let socket_path = config.socket_path();

    let health = if is_daemon_running(&socket_path).await {
        DaemonClient::new(socket_path).health().await?
    } else {
        let db = Database::new(config).await?;
        let count = ArticleRepository::new(&db).count().await;
        db.close().await;
        HealthResponse {
            status: "ok".to_string(),
            articles_count: count?,
            last_check: Utc::now(),
        }
    };

    println!("status: {}", health.status);
    println!("articles: {}", health.articles_count);
    println!("checked at: {}", health.last_check.to_rfc3339());

    Ok(())
}
