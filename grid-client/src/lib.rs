//! Grid HTTP Client
//!
//! A small, type-safe client for the grid's text-generation queue API.
//!
//! The worker uses it to claim jobs, submit results and look up the account
//! behind the configured API key. Transport failures are classified so the
//! caller can tell an unreachable grid from a slow one.
//!
//! # Example
//!
//! ```no_run
//! use grid_client::GridClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = GridClient::new("https://api.aipowergrid.io/api", "my-api-key")?;
//!
//!     if let Some(user) = client.find_user().await {
//!         println!("Logged in as {}", user.username);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod users;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobs::SubmitRetry;

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Agent string reported to the grid when popping jobs (`name:version:url`)
pub const BRIDGE_AGENT: &str = concat!(
    "grid-inference-worker:",
    env!("CARGO_PKG_VERSION"),
    ":https://github.com/AIPowerGrid/text-worker-bridge"
);

/// Timeout applied to every grid request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for the grid queue API
///
/// Every request carries the `apikey` header. Endpoints are grouped into:
/// - Job lifecycle (pop, submit)
/// - Account lookup
#[derive(Debug, Clone)]
pub struct GridClient {
    /// Base URL of the grid API (e.g., "https://api.aipowergrid.io/api")
    base_url: String,
    /// API key sent with every request
    api_key: String,
    /// HTTP client instance
    client: Client,
    /// Retry policy for result submission
    submit_retry: SubmitRetry,
}

impl GridClient {
    /// Create a new grid client with the default 60 second timeout
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the grid API
    /// * `api_key` - The worker's grid API key
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(base_url, api_key, client))
    }

    /// Create a new grid client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use grid_client::GridClient;
    /// use reqwest::Client;
    ///
    /// let client = GridClient::with_client("http://localhost:7001/api", "key", Client::new());
    /// assert_eq!(client.base_url(), "http://localhost:7001/api");
    /// ```
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            submit_retry: SubmitRetry::default(),
        }
    }

    /// Override the retry policy used by [`GridClient::submit_result`]
    pub fn with_submit_retry(mut self, retry: SubmitRetry) -> Self {
        self.submit_retry = retry;
        self
    }

    /// Get the base URL of the grid
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Any non-2xx status becomes [`ClientError::ApiError`] carrying the body.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-process mock of the grid API

    use axum::Router;
    use tokio::net::TcpListener;

    /// Serves `router` on an ephemeral port and returns its base URL
    pub async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    /// A base URL nothing is listening on
    pub async fn dead_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/api", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GridClient::new("http://localhost:7001/api", "key").unwrap();
        assert_eq!(client.base_url(), "http://localhost:7001/api");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = GridClient::new("http://localhost:7001/api/", "key").unwrap();
        assert_eq!(client.base_url(), "http://localhost:7001/api");
    }

    #[test]
    fn test_bridge_agent_format() {
        let parts: Vec<&str> = BRIDGE_AGENT.splitn(3, ':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "grid-inference-worker");
        assert_eq!(parts[1], env!("CARGO_PKG_VERSION"));
    }
}
