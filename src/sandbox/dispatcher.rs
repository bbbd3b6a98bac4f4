use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::types::{PlaygroundConfig, ToolKind, ToolVersion};
use crate::error::{PlaygroundError, Result};
use crate::sandbox::factory::create_backend;
use crate::sandbox::throttle::Throttle;
use crate::sandbox::traits::SandboxBackend;
use crate::sandbox::{ExecutionRequest, ExecutionResult};

const INITIAL_CODE: &str = r#"from typing import Iterator


def fib(n: int) -> Iterator[int]:
    a, b = 0, 1
    while a < n:
        yield a
        a, b = b, a + b


fib(10)
fib("10")
"#;

/// A type-check submission as the request layer receives it.
///
/// Besides the `flags` array, any top-level field whose value is `true` is
/// read as an enabled flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInput {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub tool_selection: Option<String>,
    #[serde(default)]
    pub tool_version: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CheckInput {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    /// Every flag name the caller asked for, unfiltered.
    fn requested_flags(&self) -> impl Iterator<Item = &str> {
        let enabled = self
            .extra
            .iter()
            .filter(|(_, value)| matches!(value, serde_json::Value::Bool(true)))
            .map(|(name, _)| name.as_str());
        self.flags.iter().map(String::as_str).chain(enabled)
    }
}

/// Selection a client starts from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultSelection {
    pub tool_selection: ToolKind,
    pub tool_version: String,
    pub python_version: String,
    /// Every recognized flag, all disabled
    #[serde(flatten)]
    pub flags: BTreeMap<String, bool>,
}

/// What a client needs to build a submission form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundContext {
    pub default_config: DefaultSelection,
    /// Sample program the editor starts with
    pub initial_code: String,
    pub python_versions: Vec<String>,
    pub tool_selections: Vec<ToolKind>,
    pub tool_versions: BTreeMap<ToolKind, Vec<ToolVersion>>,
    pub flags: Vec<String>,
}

impl PlaygroundContext {
    /// Derive the document from configuration alone; no backend is touched.
    pub fn from_config(config: &PlaygroundConfig) -> Result<Self> {
        let default_tool = config
            .tool(ToolKind::Mypy)
            .or_else(|| config.tools.first())
            .ok_or_else(|| PlaygroundError::Config("at least one tool must be configured".to_string()))?;
        let default_version = default_tool.default_version().ok_or_else(|| {
            PlaygroundError::Config(format!("tool '{}' has no versions", default_tool.tool))
        })?;

        Ok(Self {
            default_config: DefaultSelection {
                tool_selection: default_tool.tool,
                tool_version: default_version.id.clone(),
                python_version: config.python.default_version.clone(),
                flags: config.flags.iter().map(|f| (f.clone(), false)).collect(),
            },
            initial_code: INITIAL_CODE.to_string(),
            python_versions: config.python.versions.clone(),
            tool_selections: config.tools.iter().map(|t| t.tool).collect(),
            tool_versions: config
                .tools
                .iter()
                .map(|t| (t.tool, t.versions.clone()))
                .collect(),
            flags: config.flags.clone(),
        })
    }
}

/// Entry point of the execution core.
///
/// Validates a submission, resolves defaults, then runs it on the backend
/// while holding a throttle slot. Backend failures are logged and replaced
/// by an opaque error naming only the tool.
pub struct Dispatcher {
    backend: Arc<dyn SandboxBackend>,
    throttle: Throttle,
    config: Arc<PlaygroundConfig>,
    known_flags: HashSet<String>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn SandboxBackend>, throttle: Throttle, config: PlaygroundConfig) -> Self {
        let known_flags = config.flags.iter().cloned().collect();
        Self {
            backend,
            throttle,
            config: Arc::new(config),
            known_flags,
        }
    }

    /// Build the configured backend and throttle.
    pub async fn from_config(config: PlaygroundConfig) -> Result<Self> {
        let backend = create_backend(&config).await?;
        let throttle = Throttle::new(config.sandbox.concurrency, config.sandbox.max_waiters);

        info!(
            backend = %backend.name(),
            concurrency = config.sandbox.concurrency,
            max_waiters = ?config.sandbox.max_waiters,
            "Dispatcher ready"
        );
        Ok(Self::new(backend, throttle, config))
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Validate a submission and resolve it into a request.
    pub fn build_request(&self, input: CheckInput) -> Result<ExecutionRequest> {
        let source = match input.source.as_deref() {
            Some(source) if !source.is_empty() => source,
            _ => return Err(PlaygroundError::Validation("'source' is required".to_string())),
        };
        let max_bytes = self.config.limits.max_source_bytes;
        if source.len() > max_bytes {
            return Err(PlaygroundError::Validation(format!(
                "'source' is larger than {} bytes",
                max_bytes
            )));
        }

        let python = &self.config.python;
        let python_version = input
            .python_version
            .as_deref()
            .filter(|v| python.versions.iter().any(|known| known.as_str() == *v))
            .unwrap_or(python.default_version.as_str());

        let tool: ToolKind = match input.tool_selection.as_deref() {
            Some(name) => name.parse().map_err(PlaygroundError::Validation)?,
            None => ToolKind::Mypy,
        };
        let tool_config = self
            .config
            .tool(tool)
            .ok_or_else(|| PlaygroundError::Validation(format!("unsupported tool: {}", tool)))?;

        let tool_version = match input.tool_version.as_deref() {
            Some(id) => tool_config.find_version(id).ok_or_else(|| {
                PlaygroundError::Validation(format!("unsupported {} version: {}", tool, id))
            })?,
            None => tool_config.default_version().ok_or_else(|| {
                PlaygroundError::Config(format!("tool '{}' has no versions", tool))
            })?,
        };

        let mut flags = BTreeSet::new();
        for name in input.requested_flags() {
            if self.known_flags.contains(name) {
                flags.insert(name.to_string());
            } else {
                debug!(flag = %name, "Dropping unrecognized flag");
            }
        }

        Ok(ExecutionRequest::new(
            source.to_string(),
            python_version.to_string(),
            tool,
            tool_version.id.clone(),
            flags,
        ))
    }

    /// Run a submission to completion.
    pub async fn dispatch(&self, input: CheckInput) -> Result<ExecutionResult> {
        let request = self.build_request(input)?;
        let tool = request.tool();
        let started = Instant::now();

        let outcome = async {
            let _permit = self.throttle.acquire().await?;
            self.backend.execute(&request).await
        }
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                info!(
                    backend = %self.backend.name(),
                    tool = %tool,
                    tool_version = %request.tool_version(),
                    python_version = %request.python_version(),
                    exit_code = result.exit_code,
                    elapsed_ms,
                    "Type check finished"
                );
                Ok(result)
            }
            Err(failure) => {
                error!(
                    backend = %self.backend.name(),
                    tool = %tool,
                    kind = %failure.kind,
                    message = %failure.message,
                    elapsed_ms,
                    "Type check failed"
                );
                Err(PlaygroundError::ExecutionFailed {
                    tool: tool.to_string(),
                })
            }
        }
    }

    /// Defaults and choices for clients.
    pub fn context(&self) -> Result<PlaygroundContext> {
        PlaygroundContext::from_config(&self.config)
    }
}
