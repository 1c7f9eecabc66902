//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod account;
mod backend;

pub use account::AccountCommands;
pub use backend::BackendCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Local inference backends
    Backend {
        #[command(subcommand)]
        command: BackendCommands,
    },
    /// Grid account
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Backend { command } => backend::handle_backend_command(command).await,
        Commands::Account { command } => account::handle_account_command(command, config).await,
    }
}
