//! Chat-completion DTOs
//!
//! OpenAI-style request and response bodies used against the local backend.

use serde::{Deserialize, Serialize};

use crate::domain::job::StopSequence;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for `POST /v1/chat/completions`
///
/// Field order is fixed so serialisation is byte-for-byte stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Ollama-only switch for reasoning models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,
}

/// Response body of a chat completion (only the fields the worker reads)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatReply>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub completion_tokens: Option<u32>,
}

impl ChatResponse {
    /// Text of the first choice, empty when absent
    pub fn first_text(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .unwrap_or("")
    }

    /// Finish reason of the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Generated token count when the backend reports usage
    pub fn completion_tokens(&self) -> Option<u32> {
        self.usage.as_ref().and_then(|u| u.completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_text() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "Hi there" }, "finish_reason": "stop" }],
            "usage": { "completion_tokens": 3 }
        }))
        .unwrap();
        assert_eq!(resp.first_text(), "Hi there");
        assert_eq!(resp.finish_reason(), Some("stop"));
        assert_eq!(resp.completion_tokens(), Some(3));
    }

    #[test]
    fn test_missing_choices_is_empty_text() {
        let resp: ChatResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp.first_text(), "");
        assert_eq!(resp.completion_tokens(), None);
    }

    #[test]
    fn test_null_content_is_empty_text() {
        let resp: ChatResponse =
            serde_json::from_value(json!({ "choices": [{ "message": { "content": null } }] }))
                .unwrap();
        assert_eq!(resp.first_text(), "");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("x")],
            max_tokens: 10,
            temperature: 0.8,
            top_p: 0.9,
            stop: None,
            frequency_penalty: None,
            presence_penalty: None,
            think: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("stop").is_none());
        assert!(value.get("think").is_none());
    }
}
