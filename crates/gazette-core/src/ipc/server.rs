//! IPC server for the daemon
//!
//! Listens on a Unix socket and answers one JSON line per request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::*;
use crate::config::AppConfig;
use crate::ingest::{Orchestrator, TriggerOutcome};
use crate::scheduler::wait_for_shutdown;
use crate::storage::{ArticleQuery, ArticleRepository, Database};
use crate::Result;

/// Maximum number of concurrent IPC requests to prevent connection pool exhaustion
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Shared state handed to every connection
#[derive(Clone)]
struct ServerContext {
    db: Database,
    orchestrator: Arc<Orchestrator>,
    start_time: Instant,
}

/// IPC server that handles client connections
pub struct DaemonServer {
    context: ServerContext,
    socket_path: PathBuf,
    request_semaphore: Arc<Semaphore>,
}

impl DaemonServer {
    pub fn new(db: Database, orchestrator: Arc<Orchestrator>, config: &AppConfig) -> Self {
        Self::with_socket_path(db, orchestrator, config.socket_path())
    }

    pub fn with_socket_path(
        db: Database,
        orchestrator: Arc<Orchestrator>,
        socket_path: PathBuf,
    ) -> Self {
        Self {
            context: ServerContext {
                db,
                orchestrator,
                start_time: Instant::now(),
            },
            socket_path,
            request_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        }
    }

    /// Run the IPC server until shutdown
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        // Remove a stale socket left by a crashed daemon
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on: {}", self.socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let context = self.context.clone();
                            let semaphore = self.request_semaphore.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, context, semaphore).await {
                                    warn!("Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    context: ServerContext,
    semaphore: Arc<Semaphore>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // Connection closed
        }

        let _permit = semaphore.acquire().await.map_err(|e| {
            crate::Error::Other(format!("Failed to acquire semaphore: {}", e))
        })?;

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!("Received request: {} (id: {})", request.method, request.id);
                handle_request(request, &context).await
            }
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                Response::error(Uuid::nil(), ERR_PARSE, format!("Parse error: {}", e))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

fn to_result<T: serde::Serialize>(id: Uuid, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(json) => Response::success(id, json),
        Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
    }
}

async fn handle_request(request: Request, context: &ServerContext) -> Response {
    let id = request.id;

    match request.method.as_str() {
        methods::PING => Response::success(id, serde_json::json!({"ok": true})),

        methods::STATUS => {
            let status = StatusResponse {
                running: true,
                uptime_secs: context.start_time.elapsed().as_secs(),
                ingesting: context.orchestrator.is_running(),
                sources: context.orchestrator.sources().len(),
                last_batch: context.orchestrator.last_report().await,
            };
            to_result(id, &status)
        }

        methods::HEALTH => match ArticleRepository::new(&context.db).count().await {
            Ok(articles_count) => to_result(
                id,
                &HealthResponse {
                    status: "ok".to_string(),
                    articles_count,
                    last_check: Utc::now(),
                },
            ),
            Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
        },

        methods::ARTICLE_LIST => {
            let params = if request.params.is_null() {
                serde_json::json!({})
            } else {
                request.params
            };

            match serde_json::from_value::<ArticleQuery>(params) {
                Ok(query) => match ArticleRepository::new(&context.db).list_page(&query).await {
                    Ok(page) => to_result(id, &page),
                    Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
                },
                Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
            }
        }

        methods::ARTICLE_GET => match serde_json::from_value::<ArticleIdParams>(request.params) {
            Ok(params) => match ArticleRepository::new(&context.db).find_by_id(params.id).await {
                Ok(Some(article)) => to_result(id, &ArticleResponse { article }),
                Ok(None) => Response::error(
                    id,
                    ERR_NOT_FOUND,
                    crate::Error::ArticleNotFound(params.id).to_string(),
                ),
                Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
            },
            Err(e) => Response::error(id, ERR_INVALID_PARAMS, e.to_string()),
        },

        methods::INGEST_RUN => match context.orchestrator.trigger().await {
            Ok(TriggerOutcome::Completed(report)) => to_result(id, &report),
            Ok(TriggerOutcome::AlreadyRunning) => Response::error(
                id,
                ERR_ALREADY_RUNNING,
                crate::Error::BatchInProgress.to_string(),
            ),
            Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
        },

        _ => Response::error(id, ERR_METHOD_NOT_FOUND, "Method not found"),
    }
}
