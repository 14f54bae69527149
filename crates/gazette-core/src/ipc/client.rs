//! IPC client for connecting to the daemon

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::protocol::*;
use crate::feed::Article;
use crate::ingest::{BatchReport, TriggerOutcome};
use crate::storage::{ArticlePage, ArticleQuery};
use crate::{Error, Result};

/// Client for communicating with the daemon
#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Check if daemon is running by sending a ping
    pub async fn ping(&self) -> Result<bool> {
        match self.call(methods::PING, serde_json::Value::Null).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let result = self.call(methods::STATUS, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let result = self.call(methods::HEALTH, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage> {
        let result = self
            .call(methods::ARTICLE_LIST, serde_json::to_value(query)?)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Get a single article by ID; `None` when the daemon reports it missing
    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let params = serde_json::json!({ "id": id });
        let response = self.call_raw(methods::ARTICLE_GET, params).await?;

        match response.error {
            Some(err) if err.code == ERR_NOT_FOUND => Ok(None),
            Some(err) => Err(rpc_error(err)),
            None => {
                let result = response
                    .result
                    .ok_or_else(|| Error::Other("Empty response".to_string()))?;
                let response: ArticleResponse = serde_json::from_value(result)?;
                Ok(Some(response.article))
            }
        }
    }

    /// Ask the daemon to run a batch now and wait for its report
    pub async fn run_ingest(&self) -> Result<TriggerOutcome> {
        let response = self
            .call_raw(methods::INGEST_RUN, serde_json::Value::Null)
            .await?;

        match response.error {
            Some(err) if err.code == ERR_ALREADY_RUNNING => Ok(TriggerOutcome::AlreadyRunning),
            Some(err) => Err(rpc_error(err)),
            None => {
                let result = response
                    .result
                    .ok_or_else(|| Error::Other("Empty response".to_string()))?;
                let report: BatchReport = serde_json::from_value(result)?;
                Ok(TriggerOutcome::Completed(report))
            }
        }
    }

    /// Send a request and return its result, turning RPC errors into `Err`
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let response = self.call_raw(method, params).await?;

        if let Some(error) = response.error {
            return Err(rpc_error(error));
        }

        response.result.ok_or_else(|| Error::Other("Empty response".to_string()))
    }

    async fn call_raw(&self, method: &str, params: serde_json::Value) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to connect to daemon at {}: {}. Is the daemon running?",
                self.socket_path.display(),
                e
            ))
        })?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = Request::new(method).with_params(params);
        let request_json = serde_json::to_string(&request)?;

        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut response_line = String::new();
        reader.read_line(&mut response_line).await?;

        Ok(serde_json::from_str(&response_line)?)
    }
}

fn rpc_error(error: RpcError) -> Error {
    Error::Other(format!("RPC error {}: {}", error.code, error.message))
}

/// Check if daemon is reachable
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    let client = DaemonClient::new(socket_path.to_path_buf());
    client.ping().await.unwrap_or(false)
}
