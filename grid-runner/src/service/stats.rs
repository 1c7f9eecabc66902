//! Running statistics
//!
//! Cumulative counters plus a one-hour rolling log of rewards, from which
//! reward/hour and jobs/hour are extrapolated. Owned by the pipeline task;
//! readers get a [`StatsSnapshot`].

use chrono::{DateTime, Utc};
use grid_core::domain::status::StatsSnapshot;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Length of the rolling window
pub const WINDOW: Duration = Duration::from_secs(3600);

/// Shortest window span rates are extrapolated from
pub const MIN_SPAN: Duration = Duration::from_secs(10);

/// Statistics of one worker run
#[derive(Debug, Clone)]
pub struct WorkerStats {
    started: Instant,
    /// (reward, completed at), oldest first
    window: VecDeque<(f64, Instant)>,
    jobs_completed: u64,
    jobs_failed: u64,
    total_tokens: u64,
    total_reward: f64,
    last_job_reward: f64,
    last_job_at: Option<DateTime<Utc>>,
    last_job_instant: Option<Instant>,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            started,
            window: VecDeque::new(),
            jobs_completed: 0,
            jobs_failed: 0,
            total_tokens: 0,
            total_reward: 0.0,
            last_job_reward: 0.0,
            last_job_at: None,
            last_job_instant: None,
        }
    }

    /// Records a completed job now
    pub fn record_completion(&mut self, reward: f64, tokens: u32) {
        self.record_completion_at(reward, tokens, Instant::now());
    }

    /// Records a completed job at `now` and drops window entries older
    /// than one hour
    pub fn record_completion_at(&mut self, reward: f64, tokens: u32, now: Instant) {
        self.window.push_back((reward, now));
        self.jobs_completed += 1;
        self.total_tokens += u64::from(tokens);
        self.total_reward += reward;
        self.last_job_reward = reward;
        self.last_job_at = Some(Utc::now());
        self.last_job_instant = Some(now);

        while let Some(&(_, ts)) = self.window.front() {
            if now.saturating_duration_since(ts) > WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.jobs_failed += 1;
    }

    /// (reward/hour, jobs/hour) extrapolated from the window
    ///
    /// Zero until the window holds two entries spanning at least
    /// [`MIN_SPAN`].
    pub fn rates_at(&self, now: Instant) -> (f64, f64) {
        let Some(&(_, oldest)) = self.window.front() else {
            return (0.0, 0.0);
        };
        let span = now.saturating_duration_since(oldest);
        if self.window.len() < 2 || span < MIN_SPAN {
            return (0.0, 0.0);
        }

        let scale = WINDOW.as_secs_f64() / span.as_secs_f64();
        let reward: f64 = self.window.iter().map(|(r, _)| r).sum();
        (reward * scale, self.window.len() as f64 * scale)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> StatsSnapshot {
        let (reward_per_hour, jobs_per_hour) = self.rates_at(now);
        StatsSnapshot {
            jobs_completed: self.jobs_completed,
            jobs_failed: self.jobs_failed,
            total_tokens: self.total_tokens,
            total_reward: self.total_reward,
            reward_per_hour,
            jobs_per_hour,
            last_job_reward: self.last_job_reward,
            last_job_at: self.last_job_at,
            uptime_secs: now.saturating_duration_since(self.started).as_secs(),
        }
    }

    /// "12s ago", "4m ago", "2h 5m ago"; `None` before the first job
    pub fn since_last_job(&self, now: Instant) -> Option<String> {
        self.last_job_instant
            .map(|ts| format_ago(now.saturating_duration_since(ts)))
    }
}

pub fn format_ago(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h {}m ago", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_rates_need_two_entries() {
        let t0 = Instant::now();
        let mut stats = WorkerStats::started_at(t0);

        stats.record_completion_at(10.0, 50, t0);
        assert_eq!(stats.rates_at(t0 + secs(60)), (0.0, 0.0));
    }

    #[test]
    fn test_rates_need_ten_second_span() {
        let t0 = Instant::now();
        let mut stats = WorkerStats::started_at(t0);

        stats.record_completion_at(10.0, 50, t0);
        stats.record_completion_at(10.0, 50, t0 + secs(5));
        assert_eq!(stats.rates_at(t0 + secs(9)), (0.0, 0.0));
    }

    #[test]
    fn test_rates_extrapolate_from_window() {
        let t0 = Instant::now();
        let mut stats = WorkerStats::started_at(t0);

        stats.record_completion_at(10.0, 50, t0);
        stats.record_completion_at(20.0, 50, t0 + secs(1800));

        let (reward_per_hour, jobs_per_hour) = stats.rates_at(t0 + secs(1800));
        assert_eq!(reward_per_hour, 60.0);
        assert_eq!(jobs_per_hour, 4.0);
    }

    #[test]
    fn test_old_entries_leave_the_window() {
        let t0 = Instant::now();
        let mut stats = WorkerStats::started_at(t0);

        stats.record_completion_at(100.0, 10, t0);
        stats.record_completion_at(1.0, 10, t0 + secs(3000));
        stats.record_completion_at(1.0, 10, t0 + secs(3601));

        // Only the two 1.0 rewards remain, spanning 601 seconds
        let (reward_per_hour, jobs_per_hour) = stats.rates_at(t0 + secs(3601));
        let scale = 3600.0 / 601.0;
        assert!((reward_per_hour - 2.0 * scale).abs() < 1e-9);
        assert!((jobs_per_hour - 2.0 * scale).abs() < 1e-9);

        // Totals are never pruned
        let snap = stats.snapshot_at(t0 + secs(3601));
        assert_eq!(snap.jobs_completed, 3);
        assert_eq!(snap.total_reward, 102.0);
        assert_eq!(snap.total_tokens, 30);
    }

    #[test]
    fn test_entry_exactly_one_hour_old_is_kept() {
        let t0 = Instant::now();
        let mut stats = WorkerStats::started_at(t0);

        stats.record_completion_at(5.0, 1, t0);
        stats.record_completion_at(5.0, 1, t0 + secs(3600));

        let (_, jobs_per_hour) = stats.rates_at(t0 + secs(3600));
        assert_eq!(jobs_per_hour, 2.0);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let t0 = Instant::now();
        let replay = |stats: &mut WorkerStats| {
            stats.record_completion_at(3.5, 40, t0 + secs(1));
            stats.record_failure();
            stats.record_completion_at(7.25, 80, t0 + secs(30));
            stats.record_failure();
        };

        let mut a = WorkerStats::started_at(t0);
        let mut b = WorkerStats::started_at(t0);
        replay(&mut a);
        replay(&mut b);

        let (sa, sb) = (a.snapshot_at(t0 + secs(60)), b.snapshot_at(t0 + secs(60)));
        assert_eq!(sa.jobs_completed, sb.jobs_completed);
        assert_eq!(sa.jobs_failed, 2);
        assert_eq!(sa.jobs_failed, sb.jobs_failed);
        assert_eq!(sa.total_tokens, sb.total_tokens);
        assert_eq!(sa.total_reward, sb.total_reward);
        assert_eq!(sa.reward_per_hour, sb.reward_per_hour);
    }

    #[test]
    fn test_snapshot_uptime_and_last_job() {
        let t0 = Instant::now();
        let mut stats = WorkerStats::started_at(t0);
        assert!(stats.since_last_job(t0).is_none());

        stats.record_completion_at(2.0, 8, t0 + secs(10));
        let snap = stats.snapshot_at(t0 + secs(70));
        assert_eq!(snap.uptime_secs, 70);
        assert_eq!(snap.last_job_reward, 2.0);
        assert!(snap.last_job_at.is_some());
        assert_eq!(stats.since_last_job(t0 + secs(70)).as_deref(), Some("1m ago"));
    }

    #[test]
    fn test_format_ago() {
        assert_eq!(format_ago(secs(12)), "12s ago");
        assert_eq!(format_ago(secs(240)), "4m ago");
        assert_eq!(format_ago(secs(7500)), "2h 5m ago");
    }
}
