use clap::Parser;

use typecheck_sandbox::cli::args::{Cli, Commands};
use typecheck_sandbox::cli::commands;
use typecheck_sandbox::config::loader::load_config;
use typecheck_sandbox::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.global_opts.verbose);

    let config_path = cli.global_opts.config.clone();
    let format = cli.global_opts.format.clone();

    // Dispatch to subcommand handler
    match cli.command {
        Commands::Check(args) => {
            let config = load_config(config_path.as_deref())?;
            commands::check(args, config, format).await?;
        }
        Commands::Context => {
            let config = load_config(config_path.as_deref())?;
            commands::context(config, format).await?;
        }
        Commands::Backends => {
            let config = load_config(config_path.as_deref())?;
            commands::backends(config, format).await?;
        }
        Commands::Init(args) => {
            commands::init(args, config_path).await?;
        }
        Commands::Config(args) => {
            let config = load_config(config_path.as_deref())?;
            commands::config(args, config, config_path).await?;
        }
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
