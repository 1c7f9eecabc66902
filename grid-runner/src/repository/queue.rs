//! Queue repository
//!
//! Claims jobs from the grid and reports their results.

use async_trait::async_trait;
use grid_client::{GridClient, Result};
use grid_core::domain::job::Job;
use grid_core::dto::queue::{PopRequest, SubmitRequest, SubmitResponse};
use tokio_util::sync::CancellationToken;

/// Repository trait for the grid job queue
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Claims one job, or `None` when the queue has nothing for us
    ///
    /// # Arguments
    /// * `req` - Worker description and advertised models
    async fn pop(&self, req: &PopRequest) -> Result<Option<Job>>;

    /// Submits the result of a claimed job
    ///
    /// Transient failures are retried inside until `cancel` fires; an
    /// error here is final. At least one attempt is made.
    ///
    /// # Arguments
    /// * `req` - Job id, generated text and state
    /// * `cancel` - Stops further retries
    async fn submit(
        &self,
        req: &SubmitRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmitResponse>;
}

/// HTTP implementation of QueueRepository
pub struct HttpQueueRepository {
    client: GridClient,
}

impl HttpQueueRepository {
    /// Creates a new queue repository
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the grid API
    /// * `api_key` - Worker API key
    pub fn new(api_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: GridClient::new(api_url, api_key)?,
        })
    }
}

#[async_trait]
impl QueueRepository for HttpQueueRepository {
    async fn pop(&self, req: &PopRequest) -> Result<Option<Job>> {
        self.client.pop_job(req).await
    }

    async fn submit(
        &self,
        req: &SubmitRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmitResponse> {
        self.client
            .submit_result_until(req, cancel.cancelled())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_core::domain::job::JobState;
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_cancelled_submit_skips_retry_delays() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let repo = HttpQueueRepository::new(&format!("http://{}/api", addr), "key").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Instant::now();
        let err = repo
            .submit(&SubmitRequest::new("abc", "", JobState::Faulted), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_unavailable(), "unexpected error: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
