use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::types::BackendType;

#[derive(Parser, Debug)]
#[clap(name = "typecheck-sandbox")]
#[clap(version, about = "Run Python type checkers against untrusted code in a sandbox")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "TYPECHECK_SANDBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Type-check a Python source file in the sandbox
    Check(CheckArgs),

    /// Print the defaults and choices offered to clients
    Context,

    /// List sandbox backends and whether they can run
    Backends,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ============================================================================
// Check Command
// ============================================================================

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Source file to check ("-" or absent reads stdin)
    pub file: Option<PathBuf>,

    /// Type checker to run (e.g., mypy, basedmypy, pyright)
    #[clap(long, short = 't')]
    pub tool: Option<String>,

    /// Tool version id (defaults to the tool's first configured version)
    #[clap(long)]
    pub tool_version: Option<String>,

    /// Target Python version (e.g., 3.12)
    #[clap(long, short = 'p')]
    pub python_version: Option<String>,

    /// Enable a checker flag by name, without leading dashes (repeatable)
    #[clap(long = "flag", short = 'f')]
    pub flags: Vec<String>,

    /// Override the configured sandbox backend
    #[clap(long, value_enum)]
    pub backend: Option<BackendType>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
