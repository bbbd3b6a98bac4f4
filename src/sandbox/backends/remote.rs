use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PlaygroundError, Result};
use crate::sandbox::traits::SandboxBackend;
use crate::sandbox::{ExecutionRequest, ExecutionResult, Failure};

/// Longest slice of an error body kept in a failure message.
const ERROR_BODY_LIMIT: usize = 200;

/// Remote-function sandbox backend.
///
/// Posts each request to a stateless HTTPS endpoint that runs the tool in its
/// own disposable environment. Nothing outlives the HTTP call.
pub struct RemoteFunctionBackend {
    client: reqwest::Client,
    url: String,
}

/// Response body of the remote endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteResult {
    #[serde(alias = "exit_code")]
    exit_code: i32,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

impl RemoteFunctionBackend {
    /// Create a backend posting to `url`, giving up on calls after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        // No idle pool: the connection closes with the call that opened it
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(PlaygroundError::Http)?;
        let url = url.into();

        info!(url = %url, timeout_secs = timeout.as_secs(), "Remote-function backend initialized");
        Ok(Self { client, url })
    }
}

fn classify(err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::timeout(format!("remote execution timed out: {}", err))
    } else {
        Failure::transport(format!("remote execution request failed: {}", err))
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl SandboxBackend for RemoteFunctionBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn execute(&self, request: &ExecutionRequest) -> std::result::Result<ExecutionResult, Failure> {
        debug!(url = %self.url, tool = %request.tool(), "Posting execution request");

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(Failure::transport(format!(
                "remote endpoint returned {}: {}",
                status,
                truncate(text.trim())
            )));
        }

        let result: RemoteResult = serde_json::from_slice(&body).map_err(|e| {
            Failure::internal(format!("malformed response from remote endpoint: {}", e))
        })?;

        info!(
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Remote execution completed"
        );

        Ok(ExecutionResult {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}
