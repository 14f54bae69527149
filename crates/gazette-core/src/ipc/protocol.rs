//! Newline-delimited JSON-RPC style messages exchanged over the daemon socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feed::Article;
use crate::ingest::BatchReport;

/// JSON-RPC style request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// JSON-RPC style response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Uuid, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Uuid, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

// Error codes
pub const ERR_PARSE: i32 = -32700;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_NOT_FOUND: i32 = -32001;
pub const ERR_ALREADY_RUNNING: i32 = -32002;

// Method names
pub mod methods {
    pub const PING: &str = "ping";
    pub const STATUS: &str = "status";
    pub const HEALTH: &str = "health";

    pub const ARTICLE_LIST: &str = "article.list";
    pub const ARTICLE_GET: &str = "article.get";

    pub const INGEST_RUN: &str = "ingest.run";
}

// Parameter structures; `article.list` takes an `ArticleQuery`

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleIdParams {
    pub id: i64,
}

// Response structures

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub uptime_secs: u64,
    /// Whether a batch holds the run-lock right now
    pub ingesting: bool,
    pub sources: usize,
    #[serde(default)]
    pub last_batch: Option<BatchReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub articles_count: u64,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleResponse {
    pub article: Article,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::new(methods::INGEST_RUN);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"method\":\"ingest.run\""));
    }

    #[test]
    fn test_request_without_params_defaults_to_null() {
        let req: Request = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","method":"ping"}"#,
        )
        .unwrap();
        assert!(req.params.is_null());
    }

    #[test]
    fn test_response_error() {
        let id = Uuid::new_v4();
        let resp = Response::error(id, ERR_NOT_FOUND, "Article not found: 7");
        assert!(!resp.is_success());
        assert_eq!(resp.error.unwrap().code, ERR_NOT_FOUND);
    }
}
