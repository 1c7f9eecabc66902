//! Job-related API endpoints

use grid_core::domain::job::Job;
use grid_core::dto::queue::{PopRequest, PopResponse, SubmitRequest, SubmitResponse};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::GridClient;
use crate::error::{ClientError, Result};

/// Retry policy for result submission
///
/// Only connection failures and timeouts are retried. The delay before
/// retry `n` (1-based) is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRetry {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; later retries grow linearly
    pub base_delay: Duration,
}

impl Default for SubmitRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(3),
        }
    }
}

impl SubmitRetry {
    /// Delay to wait after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl GridClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Claim a text-generation job from the grid
    ///
    /// # Arguments
    /// * `req` - Worker description and the model names it serves
    ///
    /// # Returns
    /// `Ok(None)` when the queue has no matching work. Connection failures
    /// surface as [`ClientError::Unavailable`], timeouts as [`ClientError::Slow`].
    pub async fn pop_job(&self, req: &PopRequest) -> Result<Option<Job>> {
        debug!(models = ?req.models, "Popping job");

        let response = self
            .client
            .post(self.url("/v2/generate/text/pop"))
            .header("apikey", &self.api_key)
            .json(req)
            .send()
            .await?;

        let pop: PopResponse = self.handle_response(response).await?;
        Ok(pop.into_job())
    }

    /// Submit the result of a job
    ///
    /// Connection failures and timeouts are retried according to the
    /// client's [`SubmitRetry`] policy. API errors are returned at once.
    ///
    /// # Arguments
    /// * `req` - Job id, generated text and state
    ///
    /// # Returns
    /// The reward granted for the submission
    pub async fn submit_result(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
        self.submit_result_until(req, std::future::pending()).await
    }

    /// Submit the result of a job, giving up on retries once `shutdown`
    /// resolves
    ///
    /// The first attempt is always made. A retry delay cut short by
    /// `shutdown` returns the error of the last attempt.
    ///
    /// # Arguments
    /// * `req` - Job id, generated text and state
    /// * `shutdown` - Resolves when the caller is stopping
    pub async fn submit_result_until<F>(
        &self,
        req: &SubmitRequest,
        shutdown: F,
    ) -> Result<SubmitResponse>
    where
        F: Future<Output = ()>,
    {
        let max_attempts = self.submit_retry.max_attempts.max(1);
        let mut attempt = 0;
        tokio::pin!(shutdown);

        loop {
            attempt += 1;
            debug!(job_id = %req.id, attempt, max_attempts, "Submitting result");

            match self.try_submit(req).await {
                Ok(resp) => {
                    debug!(job_id = %req.id, reward = resp.reward, "Submit OK");
                    return Ok(resp);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.submit_retry.delay_after(attempt);
                    warn!(
                        job_id = %req.id,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Submit retry: {}",
                        e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown => {
                            warn!(job_id = %req.id, attempt, "Submit retries abandoned on shutdown");
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    if let ClientError::ApiError { status, message } = &e {
                        warn!(job_id = %req.id, status, "Submit rejected: {}", truncate(message, 200));
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn try_submit(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
        let response = self
            .client
            .post(self.url("/v2/generate/text/submit"))
            .header("apikey", &self.api_key)
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dead_url, serve};
    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use grid_core::domain::job::JobState;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn pop_request() -> PopRequest {
        PopRequest {
            name: "test-worker".into(),
            models: vec!["grid/llama3".into()],
            max_length: 512,
            max_context_length: 4096,
            priority_usernames: vec![],
            threads: 1,
            nsfw: true,
            bridge_agent: crate::BRIDGE_AGENT.into(),
            wallet_address: None,
        }
    }

    fn fast_retry() -> SubmitRetry {
        SubmitRetry {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }

    #[derive(Default)]
    struct Recorded {
        bodies: Mutex<Vec<Value>>,
        api_keys: Mutex<Vec<String>>,
        hits: AtomicUsize,
    }

    #[test]
    fn test_retry_delays_grow_linearly() {
        let retry = SubmitRetry::default();
        assert_eq!(retry.delay_after(1), Duration::from_secs(3));
        assert_eq!(retry.delay_after(2), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_pop_returns_job_and_sends_api_key() {
        let recorded = Arc::new(Recorded::default());
        let router = Router::new()
            .route(
                "/api/v2/generate/text/pop",
                post(
                    |State(rec): State<Arc<Recorded>>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        let key = headers
                            .get("apikey")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        rec.api_keys.lock().await.push(key);
                        rec.bodies.lock().await.push(body);
                        Json(json!({
                            "id": "abc123",
                            "payload": { "prompt": "hello", "max_length": 50 }
                        }))
                    },
                ),
            )
            .with_state(recorded.clone());
        let client = GridClient::new(serve(router).await, "secret").unwrap();

        let job = client.pop_job(&pop_request()).await.unwrap().unwrap();

        assert_eq!(job.id, "abc123");
        assert_eq!(job.payload.prompt, "hello");
        assert_eq!(recorded.api_keys.lock().await.as_slice(), ["secret"]);
        let bodies = recorded.bodies.lock().await;
        assert_eq!(bodies[0]["models"], json!(["grid/llama3"]));
        assert_eq!(bodies[0]["name"], "test-worker");
        assert_eq!(bodies[0]["priority_usernames"], json!([]));
    }

    #[tokio::test]
    async fn test_pop_without_id_is_none() {
        let router = Router::new().route(
            "/api/v2/generate/text/pop",
            post(|| async { Json(json!({ "id": null, "skipped": {} })) }),
        );
        let client = GridClient::new(serve(router).await, "secret").unwrap();

        assert!(client.pop_job(&pop_request()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pop_api_error_is_not_transient() {
        let router = Router::new().route(
            "/api/v2/generate/text/pop",
            post(|| async { (StatusCode::FORBIDDEN, "bad key") }),
        );
        let client = GridClient::new(serve(router).await, "secret").unwrap();

        let err = client.pop_job(&pop_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::ApiError { status: 403, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_pop_against_dead_server_is_unavailable() {
        let client = GridClient::new(dead_url().await, "secret").unwrap();

        let err = client.pop_job(&pop_request()).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_pop_read_timeout_is_slow() {
        let router = Router::new().route(
            "/api/v2/generate/text/pop",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = GridClient::with_client(serve(router).await, "secret", http);

        let err = client.pop_job(&pop_request()).await.unwrap_err();
        assert!(err.is_slow(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_submit_returns_reward() {
        let recorded = Arc::new(Recorded::default());
        let router = Router::new()
            .route(
                "/api/v2/generate/text/submit",
                post(
                    |State(rec): State<Arc<Recorded>>, Json(body): Json<Value>| async move {
                        rec.bodies.lock().await.push(body);
                        Json(json!({ "reward": 12.5 }))
                    },
                ),
            )
            .with_state(recorded.clone());
        let client = GridClient::new(serve(router).await, "secret").unwrap();

        let resp = client
            .submit_result(&SubmitRequest::new("abc123", "Hi there", JobState::Completed))
            .await
            .unwrap();

        assert_eq!(resp.reward, 12.5);
        assert_eq!(
            recorded.bodies.lock().await[0],
            json!({ "id": "abc123", "generation": "Hi there", "seed": 0 })
        );
    }

    #[tokio::test]
    async fn test_submit_api_error_is_not_retried() {
        let recorded = Arc::new(Recorded::default());
        let router = Router::new()
            .route(
                "/api/v2/generate/text/submit",
                post(|State(rec): State<Arc<Recorded>>| async move {
                    rec.hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, "job not found")
                }),
            )
            .with_state(recorded.clone());
        let client = GridClient::new(serve(router).await, "secret")
            .unwrap()
            .with_submit_retry(fast_retry());

        let err = client
            .submit_result(&SubmitRequest::new("gone", "", JobState::Faulted))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ApiError { status: 400, .. }));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_timeouts_are_retried_up_to_the_limit() {
        let recorded = Arc::new(Recorded::default());
        let router = Router::new()
            .route(
                "/api/v2/generate/text/submit",
                post(|State(rec): State<Arc<Recorded>>| async move {
                    rec.hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({ "reward": 1.0 }))
                }),
            )
            .with_state(recorded.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = GridClient::with_client(serve(router).await, "secret", http)
            .with_submit_retry(fast_retry());

        let err = client
            .submit_result(&SubmitRequest::new("abc", "text", JobState::Completed))
            .await
            .unwrap_err();

        assert!(err.is_slow());
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_cuts_submit_retries_short() {
        let recorded = Arc::new(Recorded::default());
        let router = Router::new()
            .route(
                "/api/v2/generate/text/submit",
                post(|State(rec): State<Arc<Recorded>>| async move {
                    rec.hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({ "reward": 1.0 }))
                }),
            )
            .with_state(recorded.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let client = GridClient::with_client(serve(router).await, "secret", http)
            .with_submit_retry(SubmitRetry::default());

        let started = std::time::Instant::now();
        let err = client
            .submit_result_until(
                &SubmitRequest::new("abc", "text", JobState::Completed),
                std::future::ready(()),
            )
            .await
            .unwrap_err();

        assert!(err.is_slow());
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_submit_recovers_after_transient_failure() {
        let recorded = Arc::new(Recorded::default());
        let router = Router::new()
            .route(
                "/api/v2/generate/text/submit",
                post(|State(rec): State<Arc<Recorded>>| async move {
                    if rec.hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Json(json!({ "reward": 4.0 }))
                }),
            )
            .with_state(recorded.clone());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let client = GridClient::with_client(serve(router).await, "secret", http)
            .with_submit_retry(fast_retry());

        let resp = client
            .submit_result(&SubmitRequest::new("abc", "text", JobState::Completed))
            .await
            .unwrap();

        assert_eq!(resp.reward, 4.0);
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 2);
    }
}
