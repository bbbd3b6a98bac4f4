use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
#[cfg(unix)]
use hyper_util::client::legacy::Client;
#[cfg(unix)]
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::{demux_logs, ContainerEngine, ContainerLogs, ContainerSpec, EngineError};

/// Client for the Docker Engine REST API.
///
/// The engine exposes its API over a Unix domain socket. One client is
/// created at startup and shared by every execution; it keeps no
/// per-container state.
pub struct DockerEngine {
    socket_path: PathBuf,
    #[cfg(unix)]
    client: Client<hyperlocal::UnixConnector, Full<Bytes>>,
}

impl DockerEngine {
    /// Create a client for the engine listening on `socket_path`.
    ///
    /// Nothing is contacted here; an unreachable engine shows up on first use.
    #[cfg(unix)]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(hyperlocal::UnixConnector);

        Self {
            socket_path: socket_path.into(),
            client,
        }
    }

    #[cfg(not(unix))]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Make a request to the engine API and return the status and full body.
    #[cfg(unix)]
    async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes), EngineError> {
        let uri: hyper::Uri = hyperlocal::Uri::new(&self.socket_path, path).into();

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Accept", "application/json");
        if let Some(content_type) = content_type {
            builder = builder.header("Content-Type", content_type);
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| EngineError::Protocol(format!("Failed to build request: {}", e)))?;

        debug!(path = %path, "Container engine request");

        let response = self.client.request(req).await.map_err(|e| {
            if e.is_connect() {
                EngineError::Unavailable(format!(
                    "cannot connect to {}: {}",
                    self.socket_path.display(),
                    e
                ))
            } else {
                EngineError::Protocol(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| EngineError::Protocol(format!("Failed to read response: {}", e)))?
            .to_bytes();

        Ok((status, body))
    }

    #[cfg(not(unix))]
    async fn request(
        &self,
        _method: Method,
        _path: &str,
        _content_type: Option<&str>,
        _body: Bytes,
    ) -> Result<(StatusCode, Bytes), EngineError> {
        Err(EngineError::Unavailable(
            "the container engine socket is only supported on Unix".to_string(),
        ))
    }

    /// Send a JSON body and require a success status.
    async fn request_json<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<Bytes, EngineError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| EngineError::Protocol(format!("Failed to serialize request: {}", e)))?;
        let (status, body) = self
            .request(method, path, Some("application/json"), payload.into())
            .await?;
        expect_success(status, body)
    }

    /// Send a body-less request and require a success status.
    async fn request_empty(&self, method: Method, path: &str) -> Result<Bytes, EngineError> {
        let (status, body) = self.request(method, path, None, Bytes::new()).await?;
        expect_success(status, body)
    }
}

fn expect_success(status: StatusCode, body: Bytes) -> Result<Bytes, EngineError> {
    if status.is_success() {
        return Ok(body);
    }
    Err(EngineError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// The engine reports errors as `{"message": "..."}`; fall back to the raw body.
fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainer<'a> {
    image: &'a str,
    cmd: &'a [String],
    working_dir: &'a str,
    network_disabled: bool,
    attach_stdin: bool,
    tty: bool,
    labels: &'a HashMap<String, String>,
    host_config: HostConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfig {
    memory: i64,
    memory_swap: i64,
    pids_limit: i64,
    network_mode: &'static str,
    cap_drop: Vec<&'static str>,
    security_opt: Vec<&'static str>,
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Warnings", default)]
    warnings: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct WaitResponse {
    #[serde(rename = "StatusCode")]
    status_code: i64,
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.request_empty(Method::GET, "/_ping").await.map(|_| ())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let body = CreateContainer {
            image: &spec.image,
            cmd: &spec.cmd,
            working_dir: &spec.working_dir,
            network_disabled: spec.network_disabled,
            attach_stdin: false,
            tty: false,
            labels: &spec.labels,
            host_config: HostConfig {
                memory: spec.memory_bytes,
                // Same as memory: no swap on top of the limit
                memory_swap: spec.memory_bytes,
                pids_limit: spec.pids_limit,
                network_mode: if spec.network_disabled {
                    "none"
                } else {
                    "default"
                },
                cap_drop: vec!["ALL"],
                security_opt: vec!["no-new-privileges"],
            },
        };

        let response = self
            .request_json(Method::POST, "/containers/create", &body)
            .await?;
        let created: CreateResponse = serde_json::from_slice(&response)
            .map_err(|e| EngineError::Protocol(format!("Failed to parse create response: {}", e)))?;

        for warning in created.warnings.unwrap_or_default() {
            debug!(container_id = %created.id, warning = %warning, "Container engine warning");
        }
        Ok(created.id)
    }

    async fn put_archive(
        &self,
        id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        let (status, body) = self
            .request(
                Method::PUT,
                &format!("/containers/{}/archive?path={}", id, path),
                Some("application/x-tar"),
                archive.into(),
            )
            .await?;
        expect_success(status, body).map(|_| ())
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.request_empty(Method::POST, &format!("/containers/{}/start", id))
            .await
            .map(|_| ())
    }

    async fn wait(&self, id: &str) -> Result<i64, EngineError> {
        let body = self
            .request_empty(Method::POST, &format!("/containers/{}/wait", id))
            .await?;
        let waited: WaitResponse = serde_json::from_slice(&body)
            .map_err(|e| EngineError::Protocol(format!("Failed to parse wait response: {}", e)))?;
        Ok(waited.status_code)
    }

    async fn logs(&self, id: &str) -> Result<ContainerLogs, EngineError> {
        let body = self
            .request_empty(
                Method::GET,
                &format!("/containers/{}/logs?stdout=true&stderr=true", id),
            )
            .await?;
        demux_logs(&body)
    }

    async fn kill(&self, id: &str) -> Result<(), EngineError> {
        let (status, body) = self
            .request(
                Method::POST,
                &format!("/containers/{}/kill", id),
                None,
                Bytes::new(),
            )
            .await?;
        // 409: the container already stopped on its own
        if status == StatusCode::CONFLICT {
            return Ok(());
        }
        expect_success(status, body).map(|_| ())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        let (status, body) = self
            .request(
                Method::DELETE,
                &format!("/containers/{}?force=true&v=true", id),
                None,
                Bytes::new(),
            )
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        expect_success(status, body).map(|_| ())
    }
}
