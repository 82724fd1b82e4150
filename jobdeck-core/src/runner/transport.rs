//! Transport for the streaming run request
//!
//! The coordinator only needs "send this request, give me the body as a
//! stream of chunks". [`HttpTransport`] does that over HTTP with `reqwest`;
//! tests plug in scripted transports.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;

use super::decoder::ByteStream;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::types::PreCheck;

/// Body of the run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RunRequest {
    /// Run a saved job; the server resolves the definition
    #[serde(rename_all = "camelCase")]
    Saved { job_id: String },
    /// Run a prompt that is not saved anywhere
    #[serde(rename_all = "camelCase")]
    Adhoc {
        prompt: String,
        project_paths: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pre_check: Option<PreCheck>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_parallel: Option<u32>,
    },
}

/// Opens the streaming run request.
///
/// Dropping the returned stream aborts the underlying request.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream>;
}

/// HTTP transport for the dashboard server's run endpoint.
pub struct HttpTransport {
    http_client: reqwest::Client,
    run_url: String,
}

impl HttpTransport {
    /// Create a transport from server configuration
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            run_url: config.run_url(),
        })
    }

    pub fn run_url(&self) -> &str {
        &self.run_url
    }
}

#[async_trait]
impl JobTransport for HttpTransport {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream> {
        let response = self
            .http_client
            .post(&self.run_url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::Transport(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        tracing::debug!(url = %self.run_url, %status, "Run stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Transport(format!("stream read failed: {}", e))))
            .boxed())
    }
}
