//! Thin HTTP helper shared by every probe

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, SERVER};
use serde_json::Value;
use std::time::Duration;

use crate::error::{ProbeError, Result};

/// A successful (HTTP 200) JSON answer
#[derive(Debug, Clone)]
pub(crate) struct Fetched {
    pub body: Value,
    /// Value of the `Server` response header, if any
    pub server: Option<String>,
}

/// HTTP client configured for probing one backend
#[derive(Debug, Clone)]
pub(crate) struct Prober {
    client: Client,
    bearer: Option<String>,
}

impl Prober {
    /// Every request made through this prober gives up after `timeout`
    pub fn new(timeout: Duration, api_key: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self {
            client,
            bearer: api_key
                .filter(|k| !k.is_empty())
                .map(|k| format!("Bearer {}", k)),
        })
    }

    pub async fn get_json(&self, url: &str) -> Result<Fetched> {
        self.fetch(self.client.get(url)).await
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Fetched> {
        self.fetch(self.client.post(url).json(body)).await
    }

    /// Plain GET that only reports the status code
    pub async fn status(&self, url: &str) -> Result<u16> {
        let response = self.authorize(self.client.get(url)).send().await?;
        Ok(response.status().as_u16())
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Fetched> {
        let response = self.authorize(request).send().await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ProbeError::Status(status));
        }

        let server = response
            .headers()
            .get(SERVER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.json().await?;

        Ok(Fetched { body, server })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(bearer) => request.header(AUTHORIZATION, bearer),
            None => request,
        }
    }
}

/// Joins a base URL and an absolute path without doubling the slash
pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
