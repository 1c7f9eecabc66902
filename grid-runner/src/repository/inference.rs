//! Inference repository
//!
//! Sends chat-completion requests to the local backend. Status handling is
//! left to the caller; only transport failures are errors here.

use async_trait::async_trait;
use grid_core::dto::chat::ChatRequest;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use thiserror::Error;

/// Timeout of a single backend call
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw backend answer
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub status: u16,
    pub body: String,
}

/// The request never produced an HTTP answer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Backend connection failed: {0}")]
    Connect(String),

    #[error("Backend timed out: {0}")]
    Timeout(String),

    #[error("Backend request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Check if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Repository trait for the local inference backend
#[async_trait]
pub trait InferenceRepository: Send + Sync {
    /// Sends one chat-completion request
    ///
    /// # Arguments
    /// * `req` - The transformed job
    async fn chat(&self, req: &ChatRequest) -> Result<BackendReply, TransportError>;
}

/// HTTP implementation of InferenceRepository
pub struct HttpInferenceRepository {
    client: Client,
    completions_url: String,
    api_key: Option<String>,
}

impl HttpInferenceRepository {
    /// Creates a new inference repository
    ///
    /// # Arguments
    /// * `completions_url` - Full chat-completions endpoint
    /// * `api_key` - Bearer key, sent only when present
    pub fn new(completions_url: String, api_key: Option<String>) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(INFERENCE_TIMEOUT).build()?;
        Ok(Self {
            client,
            completions_url,
            api_key,
        })
    }
}

#[async_trait]
impl InferenceRepository for HttpInferenceRepository {
    async fn chat(&self, req: &ChatRequest) -> Result<BackendReply, TransportError> {
        let mut request = self.client.post(&self.completions_url).json(req);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(BackendReply { status, body })
    }
}
