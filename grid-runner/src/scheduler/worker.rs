//! Worker task
//!
//! Owns a [`JobPipeline`] inside a background task. The handle can stop it,
//! hand it a new configuration (picked up between cycles) and read the
//! latest status without touching the task.

use anyhow::{Context, Result};
use grid_core::domain::status::WorkerStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::pipeline::{Cycle, JobPipeline};
use crate::config::{Config, Policy};
use crate::repository::{
    HttpInferenceRepository, HttpQueueRepository, InferenceRepository, QueueRepository,
};

/// Repositories built for one configuration
pub type Repositories = (Arc<dyn QueueRepository>, Arc<dyn InferenceRepository>);

/// Builds HTTP repositories for a configuration
pub fn connect_http(config: &Config) -> Result<Repositories> {
    let queue: Arc<dyn QueueRepository> = Arc::new(
        HttpQueueRepository::new(&config.api_url, &config.api_key)
            .context("Failed to create grid client")?,
    );
    let backend: Arc<dyn InferenceRepository> = Arc::new(
        HttpInferenceRepository::new(
            config.completions_url(),
            config.backend_api_key().map(str::to_string),
        )
        .context("Failed to create backend client")?,
    );

    Ok((queue, backend))
}

pub struct Worker;

impl Worker {
    /// Starts a worker talking HTTP to the grid and the backend
    pub fn spawn(config: Config, policy: Policy) -> Result<WorkerHandle> {
        Self::spawn_with(config, policy, connect_http)
    }

    /// Starts a worker whose repositories come from `connect`
    ///
    /// `connect` runs once now and again on every reload.
    pub fn spawn_with<F>(config: Config, policy: Policy, connect: F) -> Result<WorkerHandle>
    where
        F: Fn(&Config) -> Result<Repositories> + Send + Sync + 'static,
    {
        config.validate()?;
        let config = Arc::new(config);
        let (queue, backend) = connect(&config)?;

        let cancel = CancellationToken::new();
        let pipeline = JobPipeline::new(config.clone(), policy, queue, backend, cancel.clone());

        let (config_tx, config_rx) = watch::channel(config);
        let (status_tx, status_rx) = watch::channel(pipeline.status(true));

        let task = tokio::spawn(run(pipeline, config_rx, status_tx, cancel.clone(), connect));

        Ok(WorkerHandle {
            cancel,
            config_tx,
            status_rx,
            task,
        })
    }
}

async fn run<F>(
    mut pipeline: JobPipeline,
    mut config_rx: watch::Receiver<Arc<Config>>,
    status_tx: watch::Sender<WorkerStatus>,
    cancel: CancellationToken,
    connect: F,
) where
    F: Fn(&Config) -> Result<Repositories> + Send + Sync + 'static,
{
    info!("Worker started");

    while !cancel.is_cancelled() {
        if config_rx.has_changed().unwrap_or(false) {
            let config = config_rx.borrow_and_update().clone();
            match connect(&config) {
                Ok((queue, backend)) => pipeline.reconfigure(config, queue, backend),
                Err(e) => error!("Reload failed, keeping previous configuration: {:#}", e),
            }
        }

        let cycle = pipeline.process_once().await;
        status_tx.send_replace(pipeline.status(true));
        if let Cycle::Resolved { job_id, success } = &cycle {
            debug!(job_id = %job_id, success, "Cycle finished");
        }

        if cycle == Cycle::Idle && !pipeline.pause(pipeline.policy().idle_sleep).await {
            break;
        }
    }

    status_tx.send_replace(pipeline.status(false));
    info!("Worker stopped");
}

/// Handle to a running worker
pub struct WorkerHandle {
    cancel: CancellationToken,
    config_tx: watch::Sender<Arc<Config>>,
    status_rx: watch::Receiver<WorkerStatus>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Latest published status
    pub fn status(&self) -> WorkerStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified after every cycle
    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status_rx.clone()
    }

    /// Queues a new configuration for the next cycle
    ///
    /// An invalid configuration is rejected and the current one kept.
    pub fn reconfigure(&self, config: Config) -> Result<()> {
        config.validate()?;
        self.config_tx.send_replace(Arc::new(config));
        Ok(())
    }

    /// Stops the worker and waits for it to exit
    ///
    /// A job in flight is abandoned at its next await point and still
    /// submitted with whatever it has. That submission gets one attempt;
    /// its retries are skipped.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("Worker task panicked")?;
        Ok(())
    }
}
