//! Grid Runner
//!
//! A worker that serves text-generation jobs from the grid on a local
//! inference backend.
//!
//! Architecture:
//! - Configuration: Load settings from flags, environment and `.env`
//! - Repositories: HTTP communication with the grid queue and the backend
//! - Services: Payload transformation and running statistics
//! - Scheduler: The job pipeline and the cancellable worker task
//!
//! One job is in flight at a time. Ctrl-C stops the worker after the
//! current job is submitted; SIGHUP reloads the configuration.

mod config;
mod repository;
mod scheduler;
mod service;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{BackendType, Config, Policy};
use crate::scheduler::Worker;
use grid_probe::ProbeResult;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "grid-runner")]
#[command(about = "Serve grid text-generation jobs on a local backend", long_about = None)]
struct Args {
    /// Model name as the backend knows it
    #[arg(long)]
    model: Option<String>,

    /// Backend base URL (replaces OLLAMA_URL or OPENAI_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// Grid API key
    #[arg(long)]
    api_key: Option<String>,

    /// Name this worker registers under
    #[arg(long)]
    worker_name: Option<String>,
}

impl Args {
    /// Flag value standing in for environment variable `key`
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "MODEL_NAME" => self.model.clone(),
            "GRID_API_KEY" => self.api_key.clone(),
            "GRID_WORKER_NAME" => self.worker_name.clone(),
            _ => None,
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(|key| self.lookup(key))?;
        if let Some(url) = &self.backend_url {
            match config.backend_type {
                BackendType::Ollama => config.ollama_url = url.clone(),
                BackendType::OpenAi => config.openai_url = url.clone(),
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grid_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Grid Runner");

    let args = Args::parse();
    let config = args.load_config()?;
    info!(
        "Loaded configuration: worker={}, model={}, grid_model={}, api_url={}",
        config.worker_name,
        config.model_name,
        config.grid_model_name(),
        config.api_url
    );

    check_backend(&config).await;

    let worker = Worker::spawn(config, Policy::default())?;
    info!("Worker initialized, waiting for jobs");

    wait_for_shutdown(&args, &worker).await;

    info!("Shutting down");
    let status = worker.subscribe();
    worker.stop().await?;

    let stats = status.borrow().stats.clone();
    info!(
        jobs_completed = stats.jobs_completed,
        jobs_failed = stats.jobs_failed,
        total_tokens = stats.total_tokens,
        total_reward = stats.total_reward,
        uptime_secs = stats.uptime_secs,
        "Stopped"
    );

    Ok(())
}

/// Identifies the configured backend and logs what it is
///
/// Best-effort: the worker starts even when the backend is down.
async fn check_backend(config: &Config) {
    let url = config.backend_url();
    let api_key = config.backend_api_key();

    match grid_probe::identify(url, api_key).await {
        ProbeResult::Identified(backend) => {
            let context = grid_probe::context_length(
                url,
                Some(backend.engine),
                Some(&config.model_name),
                api_key,
            )
            .await;
            info!(
                engine = %backend.name,
                version = backend.version.as_deref().unwrap_or("unknown"),
                models = backend.models.len(),
                context_length = ?context,
                "Backend detected at {}",
                url
            );
            if !backend.models.is_empty() && !backend.models.contains(&config.model_name) {
                warn!(
                    "Model {} is not listed by the backend (has: {})",
                    config.model_name,
                    backend.models.join(", ")
                );
            }
        }
        ProbeResult::AuthRequired => {
            warn!("Backend at {} requires an API key", url);
        }
        ProbeResult::Unreachable => {
            warn!("Backend at {} is not reachable yet", url);
        }
    }
}

/// Returns on Ctrl-C; reloads the configuration on SIGHUP meanwhile
#[cfg(unix)]
async fn wait_for_shutdown(args: &Args, worker: &scheduler::WorkerHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("SIGHUP reload unavailable: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    let ctrl_c = wait_for_ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => return,
            _ = hangup.recv() => {
                let stats = worker.status().stats;
                info!(
                    jobs_completed = stats.jobs_completed,
                    jobs_failed = stats.jobs_failed,
                    "SIGHUP received, reloading configuration"
                );
                match args.load_config().and_then(|config| worker.reconfigure(config)) {
                    Ok(()) => info!("New configuration applies from the next job"),
                    Err(e) => error!("Reload rejected, keeping current configuration: {:#}", e),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_args: &Args, _worker: &scheduler::WorkerHandle) {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_stand_in_for_variables() {
        let args = Args::parse_from([
            "grid-runner",
            "--model",
            "llama3",
            "--api-key",
            "k",
            "--worker-name",
            "box-1",
        ]);

        assert_eq!(args.lookup("MODEL_NAME").as_deref(), Some("llama3"));
        assert_eq!(args.lookup("GRID_API_KEY").as_deref(), Some("k"));
        assert_eq!(args.lookup("GRID_WORKER_NAME").as_deref(), Some("box-1"));
        assert!(args.lookup("OLLAMA_URL").is_none());
    }
}
