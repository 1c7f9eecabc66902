//! Job pipeline
//!
//! One cycle claims a job, turns it into a backend request, runs it with
//! bounded retries, submits whatever came out and updates the statistics.
//! Cycles are strictly sequential: at most one job is in flight.
//!
//! Every sleep races the cancellation token, and so does the in-flight
//! backend request. A cancelled job is still submitted.

use grid_client::{BRIDGE_AGENT, ClientError};
use grid_core::domain::job::{Job, JobOutcome};
use grid_core::domain::status::WorkerStatus;
use grid_core::dto::chat::{ChatRequest, ChatResponse};
use grid_core::dto::queue::{PopRequest, SubmitRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Policy, stale_budget};
use crate::repository::{InferenceRepository, QueueRepository};
use crate::service::{WorkerStats, transform};

/// What one call to [`JobPipeline::process_once`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    /// No job was claimed (empty queue, or the pop failed)
    Idle,
    /// A job was claimed and submitted (or its submission failed)
    Resolved { job_id: String, success: bool },
}

/// How the pipeline reacts to a backend status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Retry(Duration),
    Fatal,
}

fn classify_status(status: u16, policy: &Policy) -> StatusClass {
    match status {
        200 => StatusClass::Success,
        429 => StatusClass::Retry(policy.rate_limit_backoff),
        s if s >= 500 => StatusClass::Retry(policy.retry_backoff),
        _ => StatusClass::Fatal,
    }
}

fn speed_class(tokens_per_sec: f64) -> &'static str {
    if tokens_per_sec >= 10.0 {
        "fast"
    } else if tokens_per_sec >= 5.0 {
        "moderate"
    } else {
        "slow"
    }
}

/// The worker's state machine
pub struct JobPipeline {
    config: Arc<Config>,
    policy: Policy,
    queue: Arc<dyn QueueRepository>,
    backend: Arc<dyn InferenceRepository>,
    stats: WorkerStats,
    /// Failed job cycles in a row; reset on success or after a cooldown
    consecutive_failures: u32,
    /// Failed pops in a row; drives the unavailable backoff
    pop_failures: u32,
    last_error: Option<String>,
    last_waiting_log: Option<Instant>,
    cancel: CancellationToken,
}

impl JobPipeline {
    pub fn new(
        config: Arc<Config>,
        policy: Policy,
        queue: Arc<dyn QueueRepository>,
        backend: Arc<dyn InferenceRepository>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            policy,
            queue,
            backend,
            stats: WorkerStats::new(),
            consecutive_failures: 0,
            pop_failures: 0,
            last_error: None,
            last_waiting_log: None,
            cancel,
        }
    }

    /// Swaps configuration and repositories; takes effect on the next cycle
    pub fn reconfigure(
        &mut self,
        config: Arc<Config>,
        queue: Arc<dyn QueueRepository>,
        backend: Arc<dyn InferenceRepository>,
    ) {
        info!(
            model = %config.model_name,
            backend = %config.completions_url(),
            "Configuration reloaded"
        );
        self.config = config;
        self.queue = queue;
        self.backend = backend;
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn status(&self, running: bool) -> WorkerStatus {
        WorkerStatus {
            running,
            last_error: self.last_error.clone(),
            stats: self.stats.snapshot(),
        }
    }

    /// Sleeps for `duration` unless cancelled first
    ///
    /// # Returns
    /// `false` when the pipeline was cancelled
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Runs one claim → infer → submit cycle
    pub async fn process_once(&mut self) -> Cycle {
        let Some(job) = self.claim().await else {
            return Cycle::Idle;
        };

        let request = transform(&job.payload, &self.config.model_name);
        let budget = stale_budget(request.max_tokens, &self.config);
        info!(
            job_id = job.short_id(),
            model = %self.config.model_name,
            max_tokens = request.max_tokens,
            budget_secs = budget.as_secs(),
            "Job received"
        );

        let outcome = self.infer(&job, &request, budget).await;
        let success = self.submit(&job, &outcome).await;

        if self.consecutive_failures >= self.policy.cooldown_threshold {
            error!(
                failures = self.consecutive_failures,
                cooldown_secs = self.policy.cooldown.as_secs(),
                "Too many consecutive failures, cooling down"
            );
            self.pause(self.policy.cooldown).await;
            self.consecutive_failures = 0;
        }

        Cycle::Resolved {
            job_id: job.id,
            success,
        }
    }

    // =============================================================================
    // Claim
    // =============================================================================

    fn pop_request(&self) -> PopRequest {
        PopRequest {
            name: self.config.worker_name.clone(),
            models: vec![self.config.grid_model_name()],
            max_length: self.config.max_length,
            max_context_length: self.config.max_context_length,
            priority_usernames: Vec::new(),
            threads: self.config.max_threads,
            nsfw: self.config.nsfw,
            bridge_agent: BRIDGE_AGENT.to_string(),
            wallet_address: self.config.wallet_address.clone(),
        }
    }

    async fn claim(&mut self) -> Option<Job> {
        let result = self.queue.pop(&self.pop_request()).await;

        match result {
            Ok(job) => {
                self.pop_failures = 0;
                if job.is_none() {
                    self.log_waiting();
                }
                job
            }
            Err(e @ ClientError::Unavailable(_)) => {
                self.pop_failures += 1;
                let wait = self.policy.pop_backoff(self.pop_failures);
                warn!(
                    api_url = %self.config.api_url,
                    wait_secs = wait.as_secs(),
                    "Grid unavailable during pop: {}",
                    e
                );
                self.last_error = Some(e.to_string());
                self.pause(wait).await;
                None
            }
            Err(e @ ClientError::Slow(_)) => {
                warn!(
                    api_url = %self.config.api_url,
                    wait_secs = self.policy.slow_pop_backoff.as_secs(),
                    "Grid timed out during pop"
                );
                self.last_error = Some(e.to_string());
                self.pause(self.policy.slow_pop_backoff).await;
                None
            }
            Err(e) => {
                self.pop_failures += 1;
                error!("Pop error: {}", e);
                self.last_error = Some(e.to_string());
                self.pause(self.policy.pop_error_backoff).await;
                None
            }
        }
    }

    fn log_waiting(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_waiting_log {
            if now.saturating_duration_since(last) < self.policy.waiting_log_interval {
                return;
            }
        }
        self.last_waiting_log = Some(now);

        let (reward_per_hour, jobs_per_hour) = self.stats.rates_at(now);
        let last_job = self.stats.since_last_job(now);
        info!(
            threads = self.config.max_threads,
            reward_per_hour = format!("{:.1}", reward_per_hour),
            jobs_per_hour = format!("{:.1}", jobs_per_hour),
            last_job = last_job.as_deref().unwrap_or("never"),
            "Waiting for jobs"
        );
    }

    // =============================================================================
    // Inference
    // =============================================================================

    async fn infer(&self, job: &Job, request: &ChatRequest, budget: Duration) -> JobOutcome {
        let started = Instant::now();
        let max_attempts = self.policy.inference_attempts;
        let mut attempt = 0;

        while attempt < max_attempts {
            let elapsed = started.elapsed();
            if elapsed > budget {
                warn!(
                    job_id = job.short_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Job is stale, aborting"
                );
                break;
            }

            attempt += 1;
            let reply = tokio::select! {
                _ = self.cancel.cancelled() => None,
                reply = self.backend.chat(request) => Some(reply),
            };
            let Some(reply) = reply else {
                warn!(job_id = job.short_id(), "Inference cancelled");
                break;
            };

            let delay = match reply {
                Ok(reply) => match classify_status(reply.status, &self.policy) {
                    StatusClass::Success => {
                        return parse_completion(&reply.body, request.max_tokens, started.elapsed());
                    }
                    StatusClass::Retry(delay) => {
                        warn!(
                            job_id = job.short_id(),
                            status = reply.status,
                            attempt,
                            max_attempts,
                            "Backend busy, retrying"
                        );
                        delay
                    }
                    StatusClass::Fatal => {
                        error!(
                            job_id = job.short_id(),
                            status = reply.status,
                            "Backend error: {}",
                            truncate(&reply.body, 80)
                        );
                        return JobOutcome::Faulted {
                            reason: format!("backend returned {}", reply.status),
                            elapsed: started.elapsed(),
                        };
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(job_id = job.short_id(), attempt, max_attempts, "{}", e);
                    self.policy.retry_backoff
                }
                Err(e) => {
                    error!(job_id = job.short_id(), "{}", e);
                    return JobOutcome::Faulted {
                        reason: e.to_string(),
                        elapsed: started.elapsed(),
                    };
                }
            };

            if attempt < max_attempts && !self.pause(delay).await {
                warn!(job_id = job.short_id(), "Inference cancelled");
                break;
            }
        }

        JobOutcome::Empty {
            elapsed: started.elapsed(),
        }
    }

    // =============================================================================
    // Submit
    // =============================================================================

    /// Submits the outcome and records it
    ///
    /// # Returns
    /// `true` when the grid accepted non-empty, non-faulted text
    async fn submit(&mut self, job: &Job, outcome: &JobOutcome) -> bool {
        let req = SubmitRequest::new(job.id.clone(), outcome.text(), outcome.state());
        debug!(job_id = job.short_id(), state = ?req.state, "Submitting");

        let reason = match (self.queue.submit(&req, &self.cancel).await, outcome) {
            (Ok(resp), JobOutcome::Completed { tokens, elapsed, .. }) => {
                self.consecutive_failures = 0;
                self.stats.record_completion(resp.reward, *tokens);
                self.log_completed(job, *tokens, *elapsed, resp.reward);
                return true;
            }
            (Ok(_), JobOutcome::Faulted { reason, .. }) => reason.clone(),
            (Ok(_), JobOutcome::Empty { .. }) => "no text generated".to_string(),
            (Err(e), _) => format!("submit failed: {}", e),
        };

        self.consecutive_failures += 1;
        self.stats.record_failure();
        warn!(
            job_id = job.short_id(),
            model = %self.config.model_name,
            failures = self.consecutive_failures,
            "Job failed: {}",
            reason
        );
        self.last_error = Some(reason);
        false
    }

    fn log_completed(&self, job: &Job, tokens: u32, elapsed: Duration, reward: f64) {
        let secs = elapsed.as_secs_f64();
        let tps = if secs > 0.0 { tokens as f64 / secs } else { 0.0 };
        let (reward_per_hour, jobs_per_hour) = self.stats.rates_at(Instant::now());
        info!(
            job_id = job.short_id(),
            model = %self.config.model_name,
            tokens,
            elapsed_ms = elapsed.as_millis() as u64,
            tps = format!("{:.1}", tps),
            speed = speed_class(tps),
            reward,
            reward_per_hour = format!("{:.1}", reward_per_hour),
            jobs_per_hour = format!("{:.1}", jobs_per_hour),
            "Job completed"
        );
    }
}

/// Turns a 200 body into an outcome
///
/// An unreadable body faults the job; a readable one without text is empty.
/// The text is submitted exactly as the backend produced it.
fn parse_completion(body: &str, max_tokens: u32, elapsed: Duration) -> JobOutcome {
    let response: ChatResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            return JobOutcome::Faulted {
                reason: format!("unreadable backend response: {}", e),
                elapsed,
            };
        }
    };

    let text = response.first_text();
    if text.is_empty() {
        return JobOutcome::Empty { elapsed };
    }

    JobOutcome::Completed {
        tokens: response.completion_tokens().unwrap_or(max_tokens),
        text: text.to_string(),
        elapsed,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
