use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use tracing::info;

use crate::cli::args::{CheckArgs, ConfigAction, ConfigArgs, InitArgs, OutputFormat};
use crate::config::loader::get_config_path;
use crate::config::types::PlaygroundConfig;
use crate::error::{PlaygroundError, Result};
use crate::sandbox::{available_backends, CheckInput, Dispatcher, ExecutionResult, PlaygroundContext};

// ============================================================================
// Check Commands
// ============================================================================

/// Type-check one file through the dispatcher
pub async fn check(args: CheckArgs, mut config: PlaygroundConfig, format: OutputFormat) -> Result<()> {
    if let Some(backend) = args.backend {
        config.sandbox.backend = backend;
        config.validate()?;
    }

    let source = read_source(args.file.as_deref()).await?;
    info!(
        backend = %config.sandbox.backend,
        bytes = source.len(),
        tool = ?args.tool,
        "Checking source"
    );

    let dispatcher = Dispatcher::from_config(config).await?;
    let input = CheckInput {
        python_version: args.python_version,
        tool_selection: args.tool,
        tool_version: args.tool_version,
        flags: args.flags,
        ..CheckInput::new(source)
    };

    let result = dispatcher.dispatch(input).await?;
    output_execution_result(&result, format);
    Ok(())
}

pub async fn context(config: PlaygroundConfig, format: OutputFormat) -> Result<()> {
    let context = PlaygroundContext::from_config(&config)?;

    match format {
        OutputFormat::Text => {
            let defaults = &context.default_config;
            println!(
                "Default:  {} {} (python {})",
                defaults.tool_selection, defaults.tool_version, defaults.python_version
            );
            println!("Python:   {}", context.python_versions.join(", "));
            println!();
            println!("Tools:");
            for (tool, versions) in &context.tool_versions {
                let ids: Vec<&str> = versions.iter().map(|v| v.id.as_str()).collect();
                println!("  {:<12} {}", tool.as_str(), ids.join(", "));
            }
            println!();
            println!("Flags:");
            for flag in &context.flags {
                println!("  {}", flag);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
    }

    Ok(())
}

pub async fn backends(config: PlaygroundConfig, format: OutputFormat) -> Result<()> {
    let backends = available_backends(&config).await;

    match format {
        OutputFormat::Text => {
            println!("{:<12} {:<10} DESCRIPTION", "BACKEND", "STATUS");
            for backend in &backends {
                let status = if backend.available { "ready" } else { "unavailable" };
                let marker = if backend.selected { "*" } else { " " };
                println!(
                    "{}{:<11} {:<10} {}",
                    marker,
                    backend.name.to_string(),
                    status,
                    backend.description
                );
                if let Some(reason) = &backend.unavailable_reason {
                    println!("{:<24}{}", "", reason);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&backends)?);
        }
    }

    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn init(args: InitArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(get_config_path);

    if config_path.exists() && !args.force {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    // Create parent directories if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let default_config = PlaygroundConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| PlaygroundError::Config(e.to_string()))?;

    std::fs::write(&config_path, toml_str)?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nQuick start:");
    println!("  # Check a file with the default tool");
    println!("  typecheck-sandbox check main.py");
    println!();
    println!("  # Pick a tool, python version and flags");
    println!("  typecheck-sandbox check main.py --tool mypy -p 3.12 -f strict");
    println!();
    println!("  # See which backends can run here");
    println!("  typecheck-sandbox backends");

    Ok(())
}

pub async fn config(args: ConfigArgs, config: PlaygroundConfig, config_path: Option<PathBuf>) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| PlaygroundError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            println!("{}", config_path.unwrap_or_else(get_config_path).display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => Ok(tokio::fs::read_to_string(path).await?),
        _ => {
            let mut source = String::new();
            tokio::io::stdin().read_to_string(&mut source).await?;
            Ok(source)
        }
    }
}

fn output_execution_result(result: &ExecutionResult, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            if !result.stdout.is_empty() {
                print!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr);
            }
            // Exit with the checker's exit code
            if result.exit_code != 0 {
                std::process::exit(result.exit_code);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                    "exit_code": result.exit_code,
                })
            );
        }
    }
}
