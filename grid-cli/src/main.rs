//! Grid CLI
//!
//! Command-line interface for finding local inference backends and checking
//! a worker's grid account.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grid")]
#[command(about = "AI Power Grid worker toolbox", long_about = None)]
struct Cli {
    /// Grid API URL
    #[arg(
        long,
        env = "GRID_API_URL",
        default_value = "https://api.aipowergrid.io/api"
    )]
    api_url: String,

    /// Grid API key
    #[arg(long, env = "GRID_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "grid_probe=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config {
        api_url: cli.api_url,
        api_key: cli.api_key.filter(|k| !k.is_empty()),
    };

    handle_command(cli.command, &config).await
}
