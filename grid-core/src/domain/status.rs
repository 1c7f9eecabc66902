//! Worker status domain model
//!
//! Read-only views handed to the presentation layer (dashboard, GUI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the running statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub total_tokens: u64,
    pub total_reward: f64,
    /// Reward extrapolated to one hour from the rolling window
    pub reward_per_hour: f64,
    /// Completed jobs extrapolated to one hour from the rolling window
    pub jobs_per_hour: f64,
    pub last_job_reward: f64,
    pub last_job_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

/// Status of the worker task as seen by collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub last_error: Option<String>,
    pub stats: StatsSnapshot,
}
