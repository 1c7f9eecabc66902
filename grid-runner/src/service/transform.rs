//! Payload transformer
//!
//! Maps a grid job payload onto a chat-completion request for the local
//! backend. Pure: the same payload and model always give the same request.

use grid_core::domain::job::JobPayload;
use grid_core::dto::chat::{ChatMessage, ChatRequest};

/// Background injected ahead of prompts that mention the project
pub const AIPG_CONTEXT: &str = "AI Power Grid (AIPG) is a distributed network for AI workloads with native cryptocurrency incentives. Key points:

- Platform: Distributed AI compute network built on AI Horde with workflow engine
- Tokenomics: 150M max supply
- Network: P2P port 8865, RPC port 9788, PoW/PoUW consensus
- Links: aipowergrid.io, explorer.aipowergrid.io, pool.aipowergrid.io
- Social: @AIPowerGrid (Twitter), t.me/AIPowerGrid (Telegram)
- Meet founder: https://calendly.com/half-aipowergrid/30min";

/// Lower-case terms that trigger the context block
pub const AIPG_TERMS: &[&str] = &["aipg", "ai power grid", "aipowergrid"];

pub const AIPG_SYSTEM_PROMPT: &str = "You are a helpful assistant with expertise in AI Power Grid (AIPG). Provide concise, accurate information about the platform.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Does the prompt mention the project (case-insensitive)?
pub fn mentions_aipg(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    AIPG_TERMS.iter().any(|term| lower.contains(term))
}

/// Builds the backend request for a job
///
/// # Arguments
/// * `payload` - Generation parameters from the grid
/// * `model` - Model name as the backend knows it
pub fn transform(payload: &JobPayload, model: &str) -> ChatRequest {
    let (system, prompt) = if mentions_aipg(&payload.prompt) {
        (
            AIPG_SYSTEM_PROMPT,
            format!("{}\n\nUser Query: {}", AIPG_CONTEXT, payload.prompt),
        )
    } else {
        (DEFAULT_SYSTEM_PROMPT, payload.prompt.clone())
    };

    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        max_tokens: payload.max_length(),
        temperature: payload.temperature(),
        top_p: payload.top_p(),
        stop: payload.stop_sequence.clone(),
        frequency_penalty: payload.frequency_penalty,
        presence_penalty: payload.presence_penalty,
        think: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_core::domain::job::StopSequence;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> JobPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_and_plain_prompt() {
        let req = transform(&payload(json!({ "prompt": "hello" })), "llama3");

        assert_eq!(req.model, "llama3");
        assert_eq!(req.max_tokens, 80);
        assert_eq!(req.temperature, 0.8);
        assert_eq!(req.top_p, 0.9);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0], ChatMessage::system(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(req.messages[1], ChatMessage::user("hello"));
        assert!(req.stop.is_none());
        assert!(req.frequency_penalty.is_none());
    }

    #[test]
    fn test_trigger_term_injects_context() {
        let req = transform(
            &payload(json!({ "prompt": "What is AIPG?", "max_length": 50 })),
            "llama3",
        );

        assert_eq!(req.messages[0].content, AIPG_SYSTEM_PROMPT);
        assert!(req.messages[1].content.starts_with(AIPG_CONTEXT));
        assert!(req.messages[1].content.ends_with("\n\nUser Query: What is AIPG?"));
        assert_eq!(req.max_tokens, 50);
    }

    #[test]
    fn test_trigger_terms_are_case_insensitive() {
        assert!(mentions_aipg("tell me about Ai Power Grid"));
        assert!(mentions_aipg("visit AIPOWERGRID.io"));
        assert!(!mentions_aipg("tell me about power grids"));
    }

    #[test]
    fn test_prompt_without_trigger_is_untouched() {
        let req = transform(&payload(json!({ "prompt": "Write a haiku" })), "m");
        assert_eq!(req.messages[1].content, "Write a haiku");
        assert!(!req.messages[1].content.contains("User Query"));
    }

    #[test]
    fn test_optional_fields_pass_through_with_coercion() {
        let req = transform(
            &payload(json!({
                "prompt": "hi",
                "max_length": "120",
                "temperature": "0.5",
                "stop_sequence": ["\n\n", "###"],
                "frequency_penalty": "0.3",
                "presence_penalty": 0.1
            })),
            "m",
        );

        assert_eq!(req.max_tokens, 120);
        assert_eq!(req.temperature, 0.5);
        assert_eq!(
            req.stop,
            Some(StopSequence::Many(vec!["\n\n".into(), "###".into()]))
        );
        assert_eq!(req.frequency_penalty, Some(0.3));
        assert_eq!(req.presence_penalty, Some(0.1));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let p = payload(json!({
            "prompt": "aipg rewards?",
            "max_length": 64,
            "top_p": 0.7,
            "stop_sequence": "END"
        }));

        let a = serde_json::to_vec(&transform(&p, "m")).unwrap();
        let b = serde_json::to_vec(&transform(&p, "m")).unwrap();
        assert_eq!(a, b);
    }
}
