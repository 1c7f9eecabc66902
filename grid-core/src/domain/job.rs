//! Job domain types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default number of tokens requested when a job does not say.
pub const DEFAULT_MAX_LENGTH: u32 = 80;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.8;
/// Default nucleus sampling threshold.
pub const DEFAULT_TOP_P: f64 = 0.9;

/// A text-generation job claimed from the grid.
///
/// Immutable once received; discarded after its result is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub payload: JobPayload,
}

impl Job {
    /// First eight characters of the id, used in log lines.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

/// Generation parameters attached to a job.
///
/// Numeric fields accept either JSON numbers or numeric strings; anything
/// else is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<StopSequence>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl JobPayload {
    pub fn max_length(&self) -> u32 {
        self.max_length.unwrap_or(DEFAULT_MAX_LENGTH)
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn top_p(&self) -> f64 {
        self.top_p.unwrap_or(DEFAULT_TOP_P)
    }
}

/// Stop sequence(s) as sent by the grid; passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    One(String),
    Many(Vec<String>),
}

/// State reported alongside a submitted generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Completed,
    Faulted,
}

impl JobState {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobState::Completed)
    }
}

/// Result of running one job against the local backend
///
/// Derived once per job; feeds both the submission and the statistics.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Text was generated.
    Completed {
        text: String,
        tokens: u32,
        elapsed: Duration,
    },
    /// The backend rejected the job in a way retrying cannot fix.
    Faulted { reason: String, elapsed: Duration },
    /// No text was produced (retries exhausted, stale, or an empty reply).
    Empty { elapsed: Duration },
}

impl JobOutcome {
    /// Text to submit for this outcome (empty unless completed).
    pub fn text(&self) -> &str {
        match self {
            JobOutcome::Completed { text, .. } => text,
            _ => "",
        }
    }

    /// State the grid should record for this outcome.
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Faulted { .. } => JobState::Faulted,
            _ => JobState::Completed,
        }
    }
}

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from_value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.min(u32::MAX as f64) as u32))
}
