//! Classification of a user-supplied backend URL
//!
//! Also hosts model listing and context-window lookup, which take an
//! engine hint and fall back to the OpenAI-compatible dialect without one.

use grid_core::domain::backend::{BackendDescriptor, Engine};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::engines::{self, ContextRule, ENGINES, EngineSpec, Matched, OPENAI_MODELS};
use crate::extract;
use crate::http::{Prober, join};

/// Per-request timeout for [`identify`]
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request timeout for model listing and context lookups
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a URL turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    /// Nothing answered
    Unreachable,
    /// Something answered with 401/403
    AuthRequired,
    /// Something answered; `engine` is `Unknown` when no probe matched
    Identified(BackendDescriptor),
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ProbeResult::Unreachable)
    }

    pub fn backend(&self) -> Option<&BackendDescriptor> {
        match self {
            ProbeResult::Identified(backend) => Some(backend),
            _ => None,
        }
    }
}

/// Strips a trailing slash and a trailing `/v1` so OpenAI-style base URLs
/// and bare host URLs address the same server
pub fn normalize_url(url: &str) -> &str {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix("/v1").unwrap_or(url)
}

/// Classify whatever is running at `url`
///
/// Tries each engine's signature endpoint in table order, then the generic
/// `/v1/models` listing, then a bare GET on the base URL.
pub async fn identify(url: &str, api_key: Option<&str>) -> ProbeResult {
    let base = normalize_url(url);
    let prober = match Prober::new(IDENTIFY_TIMEOUT, api_key) {
        Ok(prober) => prober,
        Err(e) => {
            debug!(url = base, "Cannot build probe client: {}", e);
            return ProbeResult::Unreachable;
        }
    };

    classify(&prober, base, ENGINES.iter(), true).await
}

/// Shared classification walk used by [`identify`] and the port-8000 scan
pub(crate) async fn classify<'a>(
    prober: &Prober,
    base: &str,
    candidates: impl IntoIterator<Item = &'a EngineSpec>,
    bare_fallback: bool,
) -> ProbeResult {
    for spec in candidates {
        let Some(signature) = spec.signature else {
            continue;
        };
        let Ok(fetched) = prober.get_json(&join(base, signature.path)).await else {
            continue;
        };
        if let Some(matched) = signature.shape.extract(&fetched.body) {
            debug!(url = base, engine = %spec.engine, "Signature matched");
            return ProbeResult::Identified(describe(prober, spec, base, matched).await);
        }
    }

    match prober.get_json(&join(base, OPENAI_MODELS.path)).await {
        Ok(fetched) => {
            if let Some(models) = extract::openai_models(&fetched.body) {
                let engine = engine_from_server_header(fetched.server.as_deref())
                    .unwrap_or(Engine::OpenaiCompat);
                return ProbeResult::Identified(
                    BackendDescriptor::new(engine, base).with_models(models),
                );
            }
        }
        Err(e) if e.is_auth_required() => return ProbeResult::AuthRequired,
        Err(_) => {}
    }

    if !bare_fallback {
        return ProbeResult::Unreachable;
    }

    match prober.status(base).await {
        Ok(401 | 403) => ProbeResult::AuthRequired,
        Ok(status) if status < 500 => {
            ProbeResult::Identified(BackendDescriptor::new(Engine::Unknown, base))
        }
        _ => ProbeResult::Unreachable,
    }
}

/// Builds a descriptor once a probe matched, filling in what the probe
/// body did not carry
pub(crate) async fn describe(
    prober: &Prober,
    spec: &EngineSpec,
    base: &str,
    matched: Matched,
) -> BackendDescriptor {
    let Matched {
        mut models,
        mut version,
    } = matched;

    if models.is_empty() {
        if let Ok(fetched) = prober.get_json(&join(base, spec.models.path)).await {
            models = spec
                .models
                .shape
                .extract(&fetched.body)
                .map(|m| m.models)
                .unwrap_or_default();
        }
    }

    if let Some(path) = spec.version_path {
        if let Ok(fetched) = prober.get_json(&join(base, path)).await {
            version = extract::version_of(&fetched.body).or(version);
        }
    }

    BackendDescriptor::new(spec.engine, base)
        .with_models(models)
        .with_version(version)
}

fn engine_from_server_header(server: Option<&str>) -> Option<Engine> {
    server
        .filter(|s| s.to_ascii_lowercase().contains("vllm"))
        .map(|_| Engine::Vllm)
}

/// Models advertised by the backend at `url`
///
/// Uses the engine's own listing endpoint when known, `/v1/models`
/// otherwise. Any failure yields an empty list.
pub async fn list_models(url: &str, engine: Option<Engine>, api_key: Option<&str>) -> Vec<String> {
    let base = normalize_url(url);
    let endpoint = engine
        .and_then(engines::spec_for)
        .map(|spec| spec.models)
        .unwrap_or(OPENAI_MODELS);

    let Ok(prober) = Prober::new(LOOKUP_TIMEOUT, api_key) else {
        return Vec::new();
    };

    match prober.get_json(&join(base, endpoint.path)).await {
        Ok(fetched) => endpoint
            .shape
            .extract(&fetched.body)
            .map(|m| m.models)
            .unwrap_or_default(),
        Err(e) => {
            debug!(url = base, "Model listing failed: {}", e);
            Vec::new()
        }
    }
}

/// Maximum context window of `model` on the backend at `url`
///
/// Each engine exposes this differently; see [`ContextRule`]. Returns
/// `None` when it cannot be determined.
pub async fn context_length(
    url: &str,
    engine: Option<Engine>,
    model: Option<&str>,
    api_key: Option<&str>,
) -> Option<u64> {
    let base = normalize_url(url);
    let rule = engine
        .and_then(engines::spec_for)
        .map(|spec| spec.context)
        .unwrap_or(ContextRule::OpenAiModelLen);
    let prober = Prober::new(LOOKUP_TIMEOUT, api_key).ok()?;

    let found = match rule {
        ContextRule::OllamaShow => {
            let name = model.filter(|m| !m.is_empty())?;
            let fetched = prober
                .post_json(&join(base, "/api/show"), &json!({ "name": name }))
                .await
                .ok()?;
            extract::ollama_context(&fetched.body)
        }
        ContextRule::InfoField { path, field } => {
            let fetched = prober.get_json(&join(base, path)).await.ok()?;
            extract::count_field(&fetched.body, field)
        }
        ContextRule::KoboldMax => {
            let fetched = prober
                .get_json(&join(base, "/api/extra/true_max_context_length"))
                .await
                .ok()?;
            extract::kobold_context(&fetched.body)
        }
        ContextRule::LmStudioNative => {
            let fetched = prober.get_json(&join(base, "/api/v1/models")).await.ok()?;
            extract::lmstudio_context(&fetched.body, model)
        }
        ContextRule::OpenAiModelLen => {
            let fetched = prober.get_json(&join(base, OPENAI_MODELS.path)).await.ok()?;
            extract::openai_context(&fetched.body, model)
        }
    };

    debug!(url = base, ?rule, context = ?found, "Context length lookup");
    found
}
