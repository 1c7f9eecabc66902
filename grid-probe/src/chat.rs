//! One-shot chat completion used to smoke-test a backend model

use grid_core::domain::backend::Engine;
use grid_core::dto::chat::{ChatMessage, ChatRequest, ChatResponse};
use grid_core::text::strip_thinking_tags;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ProbeError, Result};
use crate::http::join;
use crate::identify::normalize_url;

/// Timeout of one test completion
pub const TEST_TIMEOUT: Duration = Duration::from_secs(90);

const TEST_ATTEMPTS: u32 = 3;
const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(3);
const BUSY_RETRY_DELAY: Duration = Duration::from_secs(5);

const TEST_PROMPT: &str = "In one or two sentences, say hello and confirm you are ready to \
     serve text generation jobs on the AI Power Grid.";

/// Answer to the smoke-test prompt
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub prompt: String,
    pub reply: String,
    /// The backend stopped at the token limit
    pub truncated: bool,
}

/// Send one short prompt to `model` and return its answer
///
/// Read timeouts are retried after 3s, HTTP 400 and 503 (model still
/// loading) after 5s, up to three attempts in total.
pub async fn test_model(
    url: &str,
    engine: Engine,
    model: &str,
    api_key: Option<&str>,
) -> Result<ModelReply> {
    let client = Client::builder()
        .timeout(TEST_TIMEOUT)
        .build()
        .map_err(|e| ProbeError::Client(e.to_string()))?;
    let endpoint = join(normalize_url(url), "/v1/chat/completions");

    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(TEST_PROMPT)],
        max_tokens: 80,
        temperature: 0.8,
        top_p: 0.9,
        stop: None,
        frequency_penalty: None,
        presence_penalty: None,
        think: (engine == Engine::Ollama).then_some(false),
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let last = attempt >= TEST_ATTEMPTS;
        debug!(%engine, model, attempt, "Sending test prompt");

        let mut builder = client.post(&endpoint).json(&request);
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() && !last => {
                warn!(model, attempt, "Test prompt timed out, retrying");
                tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status().as_u16();
        if status == 200 {
            let body: ChatResponse = response.json().await?;
            return Ok(reply_from(&body));
        }
        if matches!(status, 400 | 503) && !last {
            warn!(model, attempt, status, "Backend not ready, retrying");
            tokio::time::sleep(BUSY_RETRY_DELAY).await;
            continue;
        }
        return Err(ProbeError::Status(status));
    }
}

fn reply_from(body: &ChatResponse) -> ModelReply {
    let truncated = body.finish_reason() == Some("length");
    let mut reply = strip_thinking_tags(body.first_text());
    if truncated {
        reply.push_str(" …");
    }
    ModelReply {
        prompt: TEST_PROMPT.to_string(),
        reply,
        truncated,
    }
}
