mod config;
mod logging;
mod server;
mod signals;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;

/// Booru API server
#[derive(Parser)]
#[command(name = "booru-server")]
#[command(about = "Booru API server: sources, posts and images over MySQL")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the HTTP listener
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (JSON, password omitted) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and entity schemas, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port);

    if cli.print_config {
        println!("{}", config.to_pretty_json()?);
        return Ok(());
    }

    logging::init(&config.logging, cli.verbose)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "booru-server starting");
            server::run(&config).await
        }
        Commands::Check => check(&config),
    }
}

fn check(config: &AppConfig) -> Result<()> {
    booru_posts::verify_schemas()?;
    config.cache.build()?;
    tracing::info!(database = %config.database.redacted_url(), "configuration is valid");
    println!("Configuration is valid");
    Ok(())
}
