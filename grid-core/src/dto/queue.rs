//! Grid queue DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobPayload, JobState};

/// Request body for `POST /v2/generate/text/pop`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopRequest {
    pub name: String,
    pub models: Vec<String>,
    pub max_length: u32,
    pub max_context_length: u32,
    pub priority_usernames: Vec<String>,
    pub threads: u32,
    pub nsfw: bool,
    pub bridge_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

/// Response body of a pop request
///
/// The grid answers with an id-less body when there is no work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PopResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Option<JobPayload>,
}

impl PopResponse {
    /// Converts the response into a job, if one was handed out
    pub fn into_job(self) -> Option<Job> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(Job {
            id,
            payload: self.payload.unwrap_or_default(),
        })
    }
}

/// Request body for `POST /v2/generate/text/submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub id: String,
    pub generation: String,
    pub seed: u64,
    #[serde(default = "completed", skip_serializing_if = "JobState::is_completed")]
    pub state: JobState,
}

fn completed() -> JobState {
    JobState::Completed
}

impl SubmitRequest {
    pub fn new(id: impl Into<String>, generation: impl Into<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            generation: generation.into(),
            seed: 0,
            state,
        }
    }
}

/// Response body of a submit request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub reward: f64,
}

/// Account details returned by `GET /v2/find_user`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub kudos: f64,
    #[serde(default)]
    pub worker_count: Option<u32>,
    #[serde(default)]
    pub trusted: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completed_submit_has_no_state() {
        let req = SubmitRequest::new("abc123", "Hi there", JobState::Completed);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({ "id": "abc123", "generation": "Hi there", "seed": 0 })
        );
    }

    #[test]
    fn test_faulted_submit_carries_state() {
        let req = SubmitRequest::new("abc123", "", JobState::Faulted);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["state"], "faulted");
    }

    #[test]
    fn test_pop_response_without_id_is_no_job() {
        let resp: PopResponse = serde_json::from_value(json!({
            "id": null,
            "skipped": { "max_length": 1 }
        }))
        .unwrap();
        assert!(resp.into_job().is_none());
    }

    #[test]
    fn test_pop_response_with_job() {
        let resp: PopResponse = serde_json::from_value(json!({
            "id": "abc123",
            "payload": { "prompt": "hello", "max_length": 50 }
        }))
        .unwrap();
        let job = resp.into_job().unwrap();
        assert_eq!(job.id, "abc123");
        assert_eq!(job.payload.prompt, "hello");
        assert_eq!(job.payload.max_length, Some(50));
    }

    #[test]
    fn test_wallet_address_omitted_when_absent() {
        let req = PopRequest {
            name: "w".into(),
            models: vec!["grid/llama3".into()],
            max_length: 512,
            max_context_length: 4096,
            priority_usernames: vec![],
            threads: 1,
            nsfw: true,
            bridge_agent: "agent".into(),
            wallet_address: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("wallet_address").is_none());
    }
}
