use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::config::types::PlaygroundConfig;
use crate::error::{PlaygroundError, Result};

/// Get the default configuration file path
pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) =
        directories::ProjectDirs::from("com", "typecheck-sandbox", "typecheck-sandbox")
    {
        proj_dirs.config_dir().join("config.toml")
    } else {
        // Fallback to home directory
        dirs_fallback().join(".typecheck-sandbox").join("config.toml")
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load configuration from file, with defaults for missing values.
///
/// An explicitly requested file must exist; the default location may be absent.
pub fn load_config(config_path: Option<&Path>) -> Result<PlaygroundConfig> {
    let explicit = config_path.is_some();
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if !path.exists() {
        if explicit {
            return Err(PlaygroundError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        // Return defaults if no config file exists
        debug!(path = %path.display(), "No configuration file, using defaults");
        return Ok(PlaygroundConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = parse_config(&content)?;

    debug!(path = %path.display(), backend = %config.sandbox.backend, "Loaded configuration");
    Ok(config)
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(content: &str) -> Result<PlaygroundConfig> {
    let config: PlaygroundConfig =
        toml::from_str(content).map_err(|e| PlaygroundError::TomlParse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
