//! Account command handlers

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;
use grid_client::GridClient;

use crate::config::Config;

/// Account subcommands
#[derive(Subcommand)]
pub enum AccountCommands {
    /// Show the account that owns the API key
    Whoami,
}

/// Handle account commands
///
/// # Arguments
/// * `command` - The account command to execute
/// * `config` - The CLI configuration
pub async fn handle_account_command(command: AccountCommands, config: &Config) -> Result<()> {
    let Some(api_key) = config.api_key.as_deref() else {
        bail!("No API key set (use --api-key or GRID_API_KEY)");
    };
    let client =
        GridClient::new(&config.api_url, api_key).context("Failed to create grid client")?;

    match command {
        AccountCommands::Whoami => whoami(&client).await,
    }
}

/// Print the account behind the key
async fn whoami(client: &GridClient) -> Result<()> {
    let Some(user) = client.find_user().await else {
        bail!("Account lookup failed at {}; check the API key", client.base_url());
    };

    println!("  {} {}", "▸".cyan(), user.username.bold());
    if let Some(id) = user.id {
        println!("    ID:        {}", id);
    }
    println!("    Kudos:     {}", format!("{:.0}", user.kudos).green());
    if let Some(workers) = user.worker_count {
        println!("    Workers:   {}", workers);
    }
    if let Some(trusted) = user.trusted {
        let trusted = if trusted { "yes".green() } else { "no".yellow() };
        println!("    Trusted:   {}", trusted);
    }

    Ok(())
}
