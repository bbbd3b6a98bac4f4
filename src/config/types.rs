use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{PlaygroundError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    /// Flag names a caller may enable; anything else is dropped
    pub flags: Vec<String>,
    pub sandbox: SandboxConfig,
    pub python: PythonConfig,
    pub limits: LimitsConfig,
    /// Supported tools with their versions and sandbox images
    pub tools: Vec<ToolConfig>,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            flags: default_flags(),
            sandbox: SandboxConfig::default(),
            python: PythonConfig::default(),
            limits: LimitsConfig::default(),
            tools: default_tools(),
        }
    }
}

impl PlaygroundConfig {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.concurrency == 0 {
            return Err(PlaygroundError::Config(
                "sandbox.concurrency must be at least 1".to_string(),
            ));
        }
        if self.sandbox.timeout_seconds == 0 {
            return Err(PlaygroundError::Config(
                "sandbox.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if !self
            .python
            .versions
            .iter()
            .any(|v| v == &self.python.default_version)
        {
            return Err(PlaygroundError::Config(format!(
                "python.default_version '{}' is not listed in python.versions",
                self.python.default_version
            )));
        }
        if self.tools.is_empty() {
            return Err(PlaygroundError::Config(
                "at least one tool must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.tool) {
                return Err(PlaygroundError::Config(format!(
                    "tool '{}' is configured more than once",
                    tool.tool
                )));
            }
            if tool.versions.is_empty() {
                return Err(PlaygroundError::Config(format!(
                    "tool '{}' has no versions",
                    tool.tool
                )));
            }
            if tool.image.trim().is_empty() {
                return Err(PlaygroundError::Config(format!(
                    "tool '{}' has no sandbox image",
                    tool.tool
                )));
            }
        }

        if self.sandbox.backend == BackendType::Remote && self.sandbox.remote.url.is_none() {
            return Err(PlaygroundError::Config(
                "sandbox.remote.url is required when backend = \"remote\"".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up the configuration of a tool.
    pub fn tool(&self, kind: ToolKind) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.tool == kind)
    }
}

/// The type of sandbox backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Ephemeral container per execution via the local container engine
    #[default]
    Container,
    /// Stateless remote execution endpoint over HTTPS
    Remote,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Container => write!(f, "container"),
            BackendType::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Which backend to use
    pub backend: BackendType,
    /// Maximum number of executions running at the same time
    pub concurrency: usize,
    /// Maximum number of callers waiting for a slot (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_waiters: Option<usize>,
    /// Hard deadline for a single execution in seconds
    pub timeout_seconds: u64,
    /// Container-specific configuration
    pub container: ContainerConfig,
    /// Remote-function-specific configuration
    pub remote: RemoteConfig,
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            concurrency: 3,
            max_waiters: Some(32),
            timeout_seconds: 30,
            container: ContainerConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

/// Container-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Path to the container engine's control socket
    pub socket_path: PathBuf,
    /// Memory limit in MB
    pub memory_limit_mb: u64,
    /// Maximum number of processes inside the container
    pub pids_limit: i64,
    /// Enable networking in the container (default: false)
    pub enable_networking: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker.sock"),
            memory_limit_mb: 256,
            pids_limit: 64,
            enable_networking: false,
        }
    }
}

/// Remote-function-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// HTTPS endpoint receiving execution requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Version used when the caller asks for none or an unknown one
    pub default_version: String,
    /// Supported versions, newest first
    pub versions: Vec<String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            default_version: "3.11".to_string(),
            versions: ["3.13", "3.12", "3.11", "3.10", "3.9", "3.8"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted source submission in bytes
    pub max_source_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 64 * 1024,
        }
    }
}

/// A type checker that can run inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Mypy,
    Basedmypy,
    Pyright,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Mypy => "mypy",
            ToolKind::Basedmypy => "basedmypy",
            ToolKind::Pyright => "pyright",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mypy" => Ok(ToolKind::Mypy),
            "basedmypy" => Ok(ToolKind::Basedmypy),
            "pyright" => Ok(ToolKind::Pyright),
            _ => Err(format!("unsupported tool: {}", s)),
        }
    }
}

/// One selectable version of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersion {
    /// Human-readable label shown to users
    pub label: String,
    /// Identifier substituted into the image reference
    pub id: String,
}

impl ToolVersion {
    fn new(label: &str, id: &str) -> Self {
        Self {
            label: label.to_string(),
            id: id.to_string(),
        }
    }
}

/// Tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tool: ToolKind,
    /// Image reference; `{version}` is replaced with the version id
    pub image: String,
    /// Available versions; the first one is the default
    pub versions: Vec<ToolVersion>,
}

impl ToolConfig {
    /// Image reference for a given version id.
    pub fn image_for(&self, version: &str) -> String {
        self.image.replace("{version}", version)
    }

    pub fn default_version(&self) -> Option<&ToolVersion> {
        self.versions.first()
    }

    pub fn find_version(&self, id: &str) -> Option<&ToolVersion> {
        self.versions.iter().find(|v| v.id == id)
    }
}

fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig {
            tool: ToolKind::Mypy,
            image: "ymyzk/mypy-playground:sandbox-{version}".to_string(),
            versions: vec![
                ToolVersion::new("mypy latest", "latest"),
                ToolVersion::new("mypy 1.11.2", "1.11.2"),
                ToolVersion::new("mypy 1.10.1", "1.10.1"),
            ],
        },
        ToolConfig {
            tool: ToolKind::Basedmypy,
            image: "ymyzk/mypy-playground:sandbox-basedmypy-{version}".to_string(),
            versions: vec![ToolVersion::new("basedmypy 2.1.0", "2.1.0")],
        },
        ToolConfig {
            tool: ToolKind::Pyright,
            image: "ymyzk/mypy-playground:sandbox-pyright-{version}".to_string(),
            versions: vec![ToolVersion::new("pyright latest", "latest")],
        },
    ]
}

fn default_flags() -> Vec<String> {
    [
        "verbose",
        "ignore-missing-imports",
        "show-error-context",
        "show-column-numbers",
        "strict",
        "check-untyped-defs",
        "disallow-any-decorated",
        "disallow-any-expr",
        "disallow-any-explicit",
        "disallow-any-generics",
        "disallow-any-unimported",
        "disallow-incomplete-defs",
        "disallow-subclassing-any",
        "disallow-untyped-calls",
        "disallow-untyped-decorators",
        "disallow-untyped-defs",
        "no-implicit-optional",
        "no-implicit-reexport",
        "local-partial-types",
        "strict-equality",
        "warn-incomplete-stub",
        "warn-redundant-casts",
        "warn-return-any",
        "warn-unreachable",
        "warn-unused-configs",
        "warn-unused-ignores",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}
