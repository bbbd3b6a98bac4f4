mod archive;
mod docker;
mod engine;
#[cfg(test)]
pub(crate) mod mock;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::types::{ContainerConfig, ToolConfig, ToolKind};
use crate::sandbox::traits::SandboxBackend;
use crate::sandbox::{CommandLine, ExecutionRequest, ExecutionResult, Failure, SOURCE_DIR};

pub use docker::DockerEngine;
pub use engine::{ContainerEngine, ContainerLogs, ContainerSpec, EngineError};

use self::archive::source_archive;

/// Label attached to every sandbox container so stray ones can be found.
const MANAGED_LABEL: &str = "managed-by";
const MANAGED_VALUE: &str = "typecheck-sandbox";

/// Container sandbox backend.
///
/// Every execution gets a brand new container: create it, upload the source,
/// run the tool under a deadline, collect its output, remove it. The
/// container is removed on every path out of [`SandboxBackend::execute`].
pub struct ContainerBackend {
    engine: Arc<dyn ContainerEngine>,
    tools: HashMap<ToolKind, ToolConfig>,
    config: ContainerConfig,
    timeout: Duration,
}

impl ContainerBackend {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        config: ContainerConfig,
        tools: &[ToolConfig],
        timeout: Duration,
    ) -> Self {
        let tools = tools.iter().map(|t| (t.tool, t.clone())).collect();

        Self {
            engine,
            tools,
            config,
            timeout,
        }
    }

    fn container_spec(&self, request: &ExecutionRequest) -> Result<ContainerSpec, Failure> {
        let tool = self.tools.get(&request.tool()).ok_or_else(|| {
            Failure::internal(format!("no sandbox image configured for {}", request.tool()))
        })?;

        Ok(ContainerSpec {
            image: tool.image_for(request.tool_version()),
            cmd: CommandLine::resolve(request).into_argv(),
            working_dir: SOURCE_DIR.to_string(),
            memory_bytes: (self.config.memory_limit_mb * 1024 * 1024) as i64,
            pids_limit: self.config.pids_limit,
            network_disabled: !self.config.enable_networking,
            labels: HashMap::from([(MANAGED_LABEL.to_string(), MANAGED_VALUE.to_string())]),
        })
    }

    /// Everything between creation and removal.
    async fn run(
        &self,
        handle: &ContainerHandle,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, Failure> {
        let id = handle.id();

        let archive = source_archive(request.source())
            .map_err(|e| Failure::internal(format!("Failed to package source: {}", e)))?;
        self.engine.put_archive(id, SOURCE_DIR, archive).await?;
        debug!(container_id = %id, "Source uploaded");

        let finished = tokio::time::timeout(self.timeout, async {
            self.engine.start(id).await?;
            self.engine.wait(id).await
        })
        .await;

        let status = match finished {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    container_id = %id,
                    timeout_secs = self.timeout.as_secs(),
                    "Execution deadline exceeded, killing container"
                );
                if let Err(e) = self.engine.kill(id).await {
                    warn!(container_id = %id, error = %e, "Failed to kill container");
                }
                return Err(Failure::timeout(format!(
                    "execution exceeded {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let logs = self.engine.logs(id).await?;
        let exit_code = i32::try_from(status).unwrap_or(i32::MAX);

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&logs.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&logs.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    fn name(&self) -> &str {
        "container"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, Failure> {
        let spec = self.container_spec(request)?;
        let image = spec.image.clone();

        let id = self.engine.create(&spec).await?;
        let handle = ContainerHandle::new(id, self.engine.clone());
        debug!(container_id = %handle.id(), image = %image, "Container created");

        let outcome = self.run(&handle, request).await;
        handle.release().await;

        match &outcome {
            Ok(result) => info!(
                image = %image,
                exit_code = result.exit_code,
                stdout_len = result.stdout.len(),
                stderr_len = result.stderr.len(),
                "Container execution completed"
            ),
            Err(failure) => debug!(image = %image, failure = %failure, "Container execution failed"),
        }
        outcome
    }

    async fn health_check(&self) -> bool {
        self.engine.ping().await.is_ok()
    }
}

/// Exclusive ownership of one sandbox container.
///
/// [`ContainerHandle::release`] removes it. If the owning future is dropped
/// before that (the caller went away), `Drop` schedules a forced removal on
/// the current runtime instead.
struct ContainerHandle {
    id: String,
    engine: Arc<dyn ContainerEngine>,
    released: bool,
}

impl ContainerHandle {
    fn new(id: String, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            id,
            engine,
            released: false,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    /// Remove the container. Failures are logged, never returned.
    async fn release(mut self) {
        match self.engine.remove(&self.id).await {
            Ok(()) => debug!(container_id = %self.id, "Container removed"),
            Err(e) => warn!(container_id = %self.id, error = %e, "Failed to remove container"),
        }
        self.released = true;
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(container_id = %id, "Execution abandoned, removing container in background");
                let engine = self.engine.clone();
                runtime.spawn(async move {
                    if let Err(e) = engine.remove(&id).await {
                        warn!(container_id = %id, error = %e, "Failed to remove abandoned container");
                    }
                });
            }
            Err(_) => {
                warn!(container_id = %id, "No runtime to remove abandoned container");
            }
        }
    }
}
