use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::types::{BackendType, PlaygroundConfig};
use crate::error::{PlaygroundError, Result};
use crate::sandbox::backends::{ContainerBackend, ContainerEngine, DockerEngine, RemoteFunctionBackend};
use crate::sandbox::traits::SandboxBackend;

/// Create the sandbox backend selected by the configuration.
///
/// Called once at startup. The container engine is pinged so a missing
/// daemon is reported early, but an unreachable engine does not prevent
/// startup: each execution reports it as `BackendUnavailable` instead.
pub async fn create_backend(config: &PlaygroundConfig) -> Result<Arc<dyn SandboxBackend>> {
    let sandbox = &config.sandbox;

    match sandbox.backend {
        BackendType::Container => {
            let engine = Arc::new(DockerEngine::new(sandbox.container.socket_path.clone()));
            match engine.ping().await {
                Ok(()) => info!(socket = %engine.socket_path().display(), "Container engine reachable"),
                Err(e) => warn!(
                    socket = %engine.socket_path().display(),
                    error = %e,
                    "Container engine is not reachable, executions will fail until it is"
                ),
            }

            Ok(Arc::new(ContainerBackend::new(
                engine,
                sandbox.container.clone(),
                &config.tools,
                sandbox.timeout(),
            )))
        }
        BackendType::Remote => {
            let url = sandbox.remote.url.as_deref().ok_or_else(|| {
                PlaygroundError::Config(
                    "sandbox.remote.url is required when backend = \"remote\"".to_string(),
                )
            })?;
            let backend = RemoteFunctionBackend::new(url, sandbox.timeout())?;
            Ok(Arc::new(backend))
        }
    }
}

/// Get information about the backends and whether each could run right now.
pub async fn available_backends(config: &PlaygroundConfig) -> Vec<BackendInfo> {
    let sandbox = &config.sandbox;

    let engine = DockerEngine::new(sandbox.container.socket_path.clone());
    let container_reason = engine.ping().await.err().map(|e| e.to_string());

    let remote_reason = match sandbox.remote.url {
        Some(_) => None,
        None => Some("sandbox.remote.url is not set".to_string()),
    };

    vec![
        BackendInfo {
            name: BackendType::Container,
            selected: sandbox.backend == BackendType::Container,
            available: container_reason.is_none(),
            description: "Ephemeral container per execution",
            unavailable_reason: container_reason,
        },
        BackendInfo {
            name: BackendType::Remote,
            selected: sandbox.backend == BackendType::Remote,
            available: remote_reason.is_none(),
            description: "Stateless remote execution endpoint",
            unavailable_reason: remote_reason,
        },
    ]
}

/// Information about a sandbox backend.
#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: BackendType,
    pub selected: bool,
    pub available: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_engine() -> (tempfile::TempDir, PlaygroundConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PlaygroundConfig::default();
        config.sandbox.container.socket_path = dir.path().join("docker.sock");
        (dir, config)
    }

    #[tokio::test]
    async fn test_remote_backend_created_from_url() {
        let mut config = PlaygroundConfig::default();
        config.sandbox.backend = BackendType::Remote;
        config.sandbox.remote.url = Some("https://example.com/typecheck".to_string());

        let backend = create_backend(&config).await.unwrap();
        assert_eq!(backend.name(), "remote");
    }

    #[tokio::test]
    async fn test_remote_backend_requires_url() {
        let mut config = PlaygroundConfig::default();
        config.sandbox.backend = BackendType::Remote;

        let err = create_backend(&config).await.err().unwrap();
        assert!(matches!(err, PlaygroundError::Config(_)));
    }

    #[tokio::test]
    async fn test_container_backend_created_without_engine() {
        let (_dir, config) = config_without_engine();

        let backend = create_backend(&config).await.unwrap();
        assert_eq!(backend.name(), "container");
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_available_backends_report_reasons() {
        let (_dir, config) = config_without_engine();

        let backends = available_backends(&config).await;
        assert_eq!(backends.len(), 2);

        let container = &backends[0];
        assert_eq!(container.name, BackendType::Container);
        assert!(container.selected);
        assert!(!container.available);
        assert!(container.unavailable_reason.is_some());

        let remote = &backends[1];
        assert!(!remote.selected);
        assert!(!remote.available);
    }
}
