use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use streakvault::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "streakvault")]
#[command(about = "Challenge streak progression, reward accrual and payout settlement engine")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.streakvault/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server with the periodic expiry sweep
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Expire overdue challenges once and exit
    Sweep,

    /// Initialize a new config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the purchasable challenge catalog
    Catalog,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let load_config = || -> Result<Config> {
        if config_path.exists() {
            Config::from_file(&config_path)
        } else {
            Ok(Config::default())
        }
    };

    match cli.command {
        Some(Commands::Serve { bind }) => {
            cli::serve::serve_command(load_config()?, bind)?;
        }
        Some(Commands::Sweep) => {
            cli::sweep::sweep_command(&load_config()?)?;
        }
        Some(Commands::Init { force }) => {
            cli::init::init_command(&config_path, force)?;
        }
        Some(Commands::Catalog) => {
            cli::catalog::catalog_command()?;
        }
        None => {
            // Default: serve on the configured address
            cli::serve::serve_command(load_config()?, None)?;
        }
    }

    Ok(())
}
