//! Backend command handlers
//!
//! Finds and inspects local inference engines.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use grid_core::domain::backend::{BackendDescriptor, Engine};
use grid_probe::ProbeResult;

/// Backend subcommands
#[derive(Subcommand)]
pub enum BackendCommands {
    /// Scan the default ports of every known engine on this machine
    Detect,
    /// Identify the engine behind a URL
    Check {
        url: String,

        /// Bearer key for backends that require one
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// List the models a backend serves
    Models {
        url: String,

        /// Skip identification and assume this engine
        #[arg(long)]
        engine: Option<Engine>,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Show the context window of a model
    ContextLength {
        url: String,

        /// Model to look up (required for Ollama)
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        engine: Option<Engine>,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Send a short prompt to a model and print the answer
    Test {
        url: String,

        #[arg(long)]
        model: String,

        #[arg(long)]
        engine: Option<Engine>,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

/// Handle backend commands
///
/// # Arguments
/// * `command` - The backend command to execute
pub async fn handle_backend_command(command: BackendCommands) -> Result<()> {
    match command {
        BackendCommands::Detect => detect().await,
        BackendCommands::Check { url, api_key } => check(&url, api_key.as_deref()).await,
        BackendCommands::Models {
            url,
            engine,
            api_key,
        } => models(&url, engine, api_key.as_deref()).await,
        BackendCommands::ContextLength {
            url,
            model,
            engine,
            api_key,
        } => context_length(&url, model.as_deref(), engine, api_key.as_deref()).await,
        BackendCommands::Test {
            url,
            model,
            engine,
            api_key,
        } => test_model(&url, &model, engine, api_key.as_deref()).await,
    }
}

/// Scan localhost for running engines
async fn detect() -> Result<()> {
    println!("{}", "Scanning local ports...".dimmed());
    let backends = grid_probe::scan().await;

    if backends.is_empty() {
        println!("{}", "No inference backends found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} backend(s):", backends.len()).bold()
        );
        println!();
        for backend in &backends {
            print_backend(backend);
        }
    }

    Ok(())
}

/// Identify the engine behind a URL
async fn check(url: &str, api_key: Option<&str>) -> Result<()> {
    match grid_probe::identify(url, api_key).await {
        ProbeResult::Identified(backend) => print_backend(&backend),
        ProbeResult::AuthRequired => {
            println!(
                "{} {} requires an API key (use --api-key)",
                "!".yellow().bold(),
                url
            );
        }
        ProbeResult::Unreachable => bail!("Nothing is listening at {}", url),
    }

    Ok(())
}

/// List a backend's models
async fn models(url: &str, engine: Option<Engine>, api_key: Option<&str>) -> Result<()> {
    let engine = resolve_engine(url, engine, api_key).await?;
    let models = grid_probe::list_models(url, Some(engine), api_key).await;

    if models.is_empty() {
        println!("{}", "No models found.".yellow());
    } else {
        println!(
            "{}",
            format!("{} serves {} model(s):", engine.display_name(), models.len()).bold()
        );
        for model in models {
            println!("  {} {}", "▸".cyan(), model);
        }
    }

    Ok(())
}

/// Show a model's context window
async fn context_length(
    url: &str,
    model: Option<&str>,
    engine: Option<Engine>,
    api_key: Option<&str>,
) -> Result<()> {
    let engine = resolve_engine(url, engine, api_key).await?;

    match grid_probe::context_length(url, Some(engine), model, api_key).await {
        Some(tokens) => println!(
            "{} {} tokens",
            "Context length:".bold(),
            tokens.to_string().green()
        ),
        None if engine == Engine::Ollama && model.is_none() => {
            bail!("Ollama needs --model to report a context length")
        }
        None => println!("{}", "Context length could not be determined.".yellow()),
    }

    Ok(())
}

/// Send the smoke-test prompt
async fn test_model(
    url: &str,
    model: &str,
    engine: Option<Engine>,
    api_key: Option<&str>,
) -> Result<()> {
    let engine = resolve_engine(url, engine, api_key).await?;
    println!(
        "{}",
        format!("Testing {} on {}...", model, engine.display_name()).dimmed()
    );

    let reply = grid_probe::test_model(url, engine, model, api_key).await?;

    println!("{} {}", "Prompt:".bold(), reply.prompt.dimmed());
    println!("{} {}", "Reply: ".bold(), reply.reply);
    if reply.truncated {
        println!("{}", "(stopped at the token limit)".yellow());
    }
    println!("{}", "Model is ready.".green());

    Ok(())
}

/// Uses the given engine, or identifies the backend to find one
async fn resolve_engine(url: &str, engine: Option<Engine>, api_key: Option<&str>) -> Result<Engine> {
    if let Some(engine) = engine {
        return Ok(engine);
    }

    match grid_probe::identify(url, api_key).await {
        ProbeResult::Identified(backend) => Ok(backend.engine),
        ProbeResult::AuthRequired => bail!("{} requires an API key (use --api-key)", url),
        ProbeResult::Unreachable => bail!("Nothing is listening at {}", url),
    }
}

/// Print a backend summary
fn print_backend(backend: &BackendDescriptor) {
    println!("  {} {}", "▸".cyan(), backend.name.bold());
    println!("    URL:       {}", backend.url);
    println!("    API:       {:?}", backend.dialect);
    println!(
        "    Version:   {}",
        backend.version.as_deref().unwrap_or("unknown").dimmed()
    );
    if backend.models.is_empty() {
        println!("    Models:    {}", "none".dimmed());
    } else {
        println!("    Models:    {}", backend.models.join(", "));
    }
    println!();
}
