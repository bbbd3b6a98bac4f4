mod backends;
mod command;
mod dispatcher;
mod factory;
mod failure;
mod throttle;
mod traits;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::types::ToolKind;

pub use backends::{
    ContainerBackend, ContainerEngine, ContainerLogs, ContainerSpec, DockerEngine, EngineError,
    RemoteFunctionBackend,
};
pub use command::{CommandLine, SOURCE_DIR, SOURCE_FILE_NAME};
pub use dispatcher::{CheckInput, DefaultSelection, Dispatcher, PlaygroundContext};
pub use factory::{available_backends, create_backend, BackendInfo};
pub use failure::{Failure, FailureKind};
pub use throttle::{Throttle, ThrottlePermit};
pub use traits::SandboxBackend;

/// A fully resolved type-check request.
///
/// Built only by the [`Dispatcher`] after validation, so every field is known
/// to be supported by the configuration and the flags are allow-listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    source: String,
    python_version: String,
    #[serde(rename = "toolSelection")]
    tool: ToolKind,
    tool_version: String,
    flags: BTreeSet<String>,
}

impl ExecutionRequest {
    pub(crate) fn new(
        source: String,
        python_version: String,
        tool: ToolKind,
        tool_version: String,
        flags: BTreeSet<String>,
    ) -> Self {
        Self {
            source,
            python_version,
            tool,
            tool_version,
            flags,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn python_version(&self) -> &str {
        &self.python_version
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }
}

/// Result of a type-check that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}
