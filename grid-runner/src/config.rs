//! Worker configuration
//!
//! `Config` is what the operator sets (grid credentials, backend address,
//! advertised limits). `Policy` holds the pipeline's timing tunables. Both
//! are plain values handed to the pipeline; a reload swaps the whole
//! `Config` rather than mutating fields in place.

use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.aipowergrid.io/api";
pub const DEFAULT_WORKER_NAME: &str = "Text-Inference-Worker";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OPENAI_URL: &str = "http://127.0.0.1:8000/v1";

/// Which dialect the configured backend speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Ollama, addressed through its OpenAI-compatible endpoint
    Ollama,
    /// Any OpenAI-compatible server
    OpenAi,
}

impl BackendType {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "openai-compat" | "vllm" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Grid API key sent with every queue request
    pub api_key: String,

    /// Grid API base URL (e.g., "https://api.aipowergrid.io/api")
    pub api_url: String,

    /// Name this worker registers under
    pub worker_name: String,

    pub nsfw: bool,
    pub max_threads: u32,

    /// Largest generation this worker accepts, in tokens
    pub max_length: u32,
    pub max_context_length: u32,

    pub backend_type: BackendType,
    pub ollama_url: String,
    pub openai_url: String,
    pub openai_api_key: String,

    /// Model name as the backend knows it
    pub model_name: String,

    /// Model name advertised to the grid; derived from `model_name` when unset
    pub grid_model_name: Option<String>,

    pub wallet_address: Option<String>,

    /// Generation speed assumed when computing the stale budget
    pub stale_tokens_per_sec: f64,

    /// Fixed slack added to the stale budget
    pub stale_grace: Duration,
}

impl Config {
    /// Creates a configuration with defaults for everything but the
    /// credentials and the model
    pub fn new(api_key: String, model_name: String) -> Self {
        Self {
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            nsfw: true,
            max_threads: 1,
            max_length: 4096,
            max_context_length: 4096,
            backend_type: BackendType::Ollama,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openai_url: DEFAULT_OPENAI_URL.to_string(),
            openai_api_key: String::new(),
            model_name,
            grid_model_name: None,
            wallet_address: None,
            stale_tokens_per_sec: 2.0,
            stale_grace: Duration::from_secs(10),
        }
    }

    /// Creates configuration from environment variables, with `.env` (if
    /// present) underneath
    ///
    /// Process variables win over the file. Nothing is written back to the
    /// environment.
    ///
    /// Expected environment variables:
    /// - GRID_API_KEY (required)
    /// - MODEL_NAME (required)
    /// - GRID_API_URL, GRID_WORKER_NAME, GRID_NSFW, GRID_MAX_THREADS,
    ///   GRID_MAX_LENGTH, GRID_MAX_CONTEXT_LENGTH (optional)
    /// - BACKEND_TYPE (`ollama` or `openai`), OLLAMA_URL, OPENAI_URL,
    ///   OPENAI_API_KEY (optional)
    /// - GRID_MODEL_NAME, WALLET_ADDRESS (optional)
    /// - GRID_STALE_TOKENS_PER_SEC, GRID_STALE_GRACE_SECS (optional)
    ///
    /// `overrides` is consulted first (command-line flags keyed by the
    /// variable they replace).
    pub fn load(overrides: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let file: Vec<(String, String)> = match dotenvy::dotenv_iter() {
            Ok(iter) => iter.filter_map(|item| item.ok()).collect(),
            Err(_) => Vec::new(),
        };

        Self::from_lookup(|key| {
            overrides(key).or_else(|| std::env::var(key).ok()).or_else(|| {
                file.iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            })
        })
    }

    /// Builds the configuration from any key-value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("GRID_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("GRID_API_KEY environment variable not set"))?;

        let model_name = get("MODEL_NAME")
            .ok_or_else(|| anyhow::anyhow!("MODEL_NAME environment variable not set"))?;

        let mut config = Self::new(api_key, model_name);

        if let Some(url) = get("GRID_API_URL") {
            config.api_url = url;
        }
        if let Some(name) = get("GRID_WORKER_NAME") {
            config.worker_name = name;
        }
        if let Some(nsfw) = get("GRID_NSFW") {
            config.nsfw = parse_bool(&nsfw).unwrap_or(config.nsfw);
        }
        config.max_threads = get("GRID_MAX_THREADS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(config.max_threads);
        config.max_length = get("GRID_MAX_LENGTH")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(config.max_length);
        config.max_context_length = get("GRID_MAX_CONTEXT_LENGTH")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(config.max_context_length);

        if let Some(kind) = get("BACKEND_TYPE") {
            config.backend_type = BackendType::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("BACKEND_TYPE must be 'ollama' or 'openai', got '{}'", kind))?;
        }
        if let Some(url) = get("OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(url) = get("OPENAI_URL") {
            config.openai_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            config.openai_api_key = key;
        }

        config.grid_model_name = get("GRID_MODEL_NAME");
        config.wallet_address = get("WALLET_ADDRESS");

        config.stale_tokens_per_sec = get("GRID_STALE_TOKENS_PER_SEC")
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(config.stale_tokens_per_sec);
        config.stale_grace = get("GRID_STALE_GRACE_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.stale_grace);

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!("api_key cannot be empty");
        }

        if self.model_name.is_empty() {
            anyhow::bail!("model_name cannot be empty");
        }

        for (name, url) in [("api_url", self.api_url.as_str()), ("backend url", self.backend_url())] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.max_threads == 0 {
            anyhow::bail!("max_threads must be greater than 0");
        }

        if self.max_length == 0 || self.max_context_length == 0 {
            anyhow::bail!("max_length and max_context_length must be greater than 0");
        }

        if !self.stale_tokens_per_sec.is_finite() || self.stale_tokens_per_sec <= 0.0 {
            anyhow::bail!("stale_tokens_per_sec must be greater than 0");
        }

        Ok(())
    }

    /// Base URL of the configured backend
    pub fn backend_url(&self) -> &str {
        match self.backend_type {
            BackendType::Ollama => &self.ollama_url,
            BackendType::OpenAi => &self.openai_url,
        }
    }

    /// Chat-completions endpoint of the configured backend
    ///
    /// `OLLAMA_URL` is a bare host; `OPENAI_URL` already ends in `/v1`.
    pub fn completions_url(&self) -> String {
        let base = self.backend_url().trim_end_matches('/');
        match self.backend_type {
            BackendType::Ollama => format!("{}/v1/chat/completions", base),
            BackendType::OpenAi => format!("{}/chat/completions", base),
        }
    }

    /// Bearer key for the backend, if any
    pub fn backend_api_key(&self) -> Option<&str> {
        match self.backend_type {
            BackendType::OpenAi if !self.openai_api_key.is_empty() => Some(&self.openai_api_key),
            _ => None,
        }
    }

    /// Model name advertised to the grid
    ///
    /// Defaults to `grid/<model>`, or `openai/<model>` when the backend is
    /// OpenAI's hosted API.
    pub fn grid_model_name(&self) -> String {
        if let Some(name) = &self.grid_model_name {
            return name.clone();
        }
        let prefix = match self.backend_type {
            BackendType::OpenAi if self.openai_url.contains("openai.com") => "openai",
            _ => "grid",
        };
        format!("{}/{}", prefix, self.model_name)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Timing tunables of the job pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Backend calls per job, including the first
    pub inference_attempts: u32,
    /// Sleep after a 5xx, connection error or timeout from the backend
    pub retry_backoff: Duration,
    /// Sleep after a 429 from the backend
    pub rate_limit_backoff: Duration,
    /// Grid unreachable: sleep `min(pop_backoff_cap, step * failures)`
    pub pop_backoff_step: Duration,
    pub pop_backoff_cap: Duration,
    /// Grid timed out on pop
    pub slow_pop_backoff: Duration,
    /// Any other pop error
    pub pop_error_backoff: Duration,
    /// Sleep between cycles when there was nothing to do
    pub idle_sleep: Duration,
    /// Minimum gap between two "waiting for jobs" lines
    pub waiting_log_interval: Duration,
    /// Consecutive failed cycles that trigger a cooldown
    pub cooldown_threshold: u32,
    pub cooldown: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            inference_attempts: 5,
            retry_backoff: Duration::from_secs(3),
            rate_limit_backoff: Duration::from_secs(5),
            pop_backoff_step: Duration::from_secs(2),
            pop_backoff_cap: Duration::from_secs(10),
            slow_pop_backoff: Duration::from_secs(2),
            pop_error_backoff: Duration::from_secs(5),
            idle_sleep: Duration::from_secs(2),
            waiting_log_interval: Duration::from_secs(5),
            cooldown_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl Policy {
    /// Backoff after `failures` consecutive unreachable pops
    pub fn pop_backoff(&self, failures: u32) -> Duration {
        (self.pop_backoff_step * failures).min(self.pop_backoff_cap)
    }
}

/// Wall-clock budget for generating `max_tokens`
///
/// `max_tokens / tokens_per_sec + grace`; 100 tokens at the defaults is 60s.
/// Saturates at `Duration::MAX` instead of overflowing.
pub fn stale_budget(max_tokens: u32, config: &Config) -> Duration {
    let secs = max_tokens as f64 / config.stale_tokens_per_sec;
    Duration::try_from_secs_f64(secs)
        .unwrap_or(Duration::MAX)
        .saturating_add(config.stale_grace)
}
