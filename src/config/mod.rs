pub mod loader;
pub mod types;

pub use loader::{get_config_path, load_config};
pub use types::{
    BackendType, ContainerConfig, PlaygroundConfig, RemoteConfig, SandboxConfig, ToolConfig,
    ToolKind, ToolVersion,
};
