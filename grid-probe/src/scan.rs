//! Parallel scan of every known engine's default port

use futures::future::join_all;
use grid_core::domain::backend::BackendDescriptor;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::engines::{ENGINES, EngineSpec, SHARED_PORT, SHARED_PORT_CANDIDATES, spec_for};
use crate::http::{Prober, join};
use crate::identify::{ProbeResult, classify, describe};

/// Timeout of a single probe request
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1200);

/// Upper bound on the time spent on one port, follow-up requests included
///
/// Ports are scanned concurrently, so this also bounds the whole scan.
pub const PORT_BUDGET: Duration = Duration::from_millis(1500);

/// Scan localhost for running inference engines
pub async fn scan() -> Vec<BackendDescriptor> {
    scan_host("127.0.0.1").await
}

/// Scan `host` for running inference engines
///
/// Every engine's default port is probed concurrently. When two records
/// share a port only the first one in table order is reported.
pub async fn scan_host(host: &str) -> Vec<BackendDescriptor> {
    let targets = ENGINES
        .iter()
        .map(|spec| (spec, format!("http://{}:{}", host, spec.default_port)))
        .collect();

    let found = scan_targets(targets).await;
    info!(host, count = found.len(), "Backend scan finished");
    found
}

/// Probes every `(engine, base URL)` pair concurrently, each within
/// [`PORT_BUDGET`]
pub(crate) async fn scan_targets(targets: Vec<(&EngineSpec, String)>) -> Vec<BackendDescriptor> {
    let probes = targets.into_iter().map(|(spec, base)| async move {
        let found = tokio::time::timeout(PORT_BUDGET, probe_port(spec, &base))
            .await
            .ok()
            .flatten();
        (spec.default_port, found)
    });

    dedupe_by_port(join_all(probes).await)
}

/// Keeps the first descriptor per port, preserving order
pub(crate) fn dedupe_by_port(
    results: Vec<(u16, Option<BackendDescriptor>)>,
) -> Vec<BackendDescriptor> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter_map(|(port, found)| found.map(|backend| (port, backend)))
        .filter(|(port, _)| seen.insert(*port))
        .map(|(_, backend)| backend)
        .collect()
}

async fn probe_port(spec: &EngineSpec, base: &str) -> Option<BackendDescriptor> {
    let prober = Prober::new(PROBE_TIMEOUT, None).ok()?;
    if spec.default_port == SHARED_PORT {
        probe_shared_port(&prober, base).await
    } else {
        probe_engine(&prober, spec, base).await
    }
}

/// Tries the engine's probe endpoints in order, stopping at the first
/// 200 whose body has the expected shape
pub(crate) async fn probe_engine(
    prober: &Prober,
    spec: &EngineSpec,
    base: &str,
) -> Option<BackendDescriptor> {
    for endpoint in spec.probes {
        let fetched = match prober.get_json(&join(base, endpoint.path)).await {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!(engine = %spec.engine, path = endpoint.path, "Probe miss: {}", e);
                continue;
            }
        };
        if let Some(matched) = endpoint.shape.extract(&fetched.body) {
            return Some(describe(prober, spec, base, matched).await);
        }
    }
    None
}

/// Engine-unique endpoints first, then the generic listing (with the
/// `Server` header hint)
pub(crate) async fn probe_shared_port(prober: &Prober, base: &str) -> Option<BackendDescriptor> {
    let candidates = SHARED_PORT_CANDIDATES.iter().filter_map(|e| spec_for(*e));
    match classify(prober, base, candidates, false).await {
        ProbeResult::Identified(backend) => Some(backend),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::{Json, Router, http::header, routing::get};
    use grid_core::domain::backend::Engine;
    use serde_json::json;

    fn prober() -> Prober {
        Prober::new(PROBE_TIMEOUT, None).unwrap()
    }

    #[test]
    fn test_dedupe_keeps_first_per_port() {
        let results = vec![
            (8000, Some(BackendDescriptor::new(Engine::Vllm, "http://h:8000"))),
            (1234, None),
            (8000, Some(BackendDescriptor::new(Engine::OpenaiCompat, "http://h:8000"))),
            (11434, Some(BackendDescriptor::new(Engine::Ollama, "http://h:11434"))),
        ];
        let kept = dedupe_by_port(results);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].engine, Engine::Vllm);
        assert_eq!(kept[1].engine, Engine::Ollama);
    }

    #[tokio::test]
    async fn test_hanging_ports_cost_one_budget() {
        let router = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({}))
        });
        let base = serve(router).await;
        let targets = ENGINES.iter().map(|spec| (spec, base.clone())).collect();

        let started = std::time::Instant::now();
        let found = scan_targets(targets).await;
        let elapsed = started.elapsed();

        assert!(found.is_empty());
        assert!(elapsed >= PROBE_TIMEOUT, "finished early: {elapsed:?}");
        assert!(elapsed < 2 * PROBE_TIMEOUT, "scan took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_shared_port_version_endpoint_wins() {
        let router = Router::new()
            .route("/version", get(|| async { Json(json!({ "version": "0.6.3" })) }))
            .route(
                "/v1/models",
                get(|| async { Json(json!({ "data": [{ "id": "mistral" }] })) }),
            );
        let base = serve(router).await;

        let backend = probe_shared_port(&prober(), &base).await.unwrap();
        assert_eq!(backend.engine, Engine::Vllm);
        assert_eq!(backend.version.as_deref(), Some("0.6.3"));
        assert_eq!(backend.models, vec!["mistral"]);
    }

    #[tokio::test]
    async fn test_shared_port_model_info_is_sglang() {
        let router = Router::new()
            .route(
                "/get_model_info",
                get(|| async { Json(json!({ "model_path": "/models/qwen" })) }),
            )
            .route(
                "/v1/models",
                get(|| async { Json(json!({ "data": [{ "id": "qwen" }] })) }),
            );
        let base = serve(router).await;

        let backend = probe_shared_port(&prober(), &base).await.unwrap();
        assert_eq!(backend.engine, Engine::Sglang);
        assert_eq!(backend.models, vec!["/models/qwen"]);
    }

    #[tokio::test]
    async fn test_shared_port_generic_listing() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async { Json(json!({ "data": [{ "id": "m" }] })) }),
        );
        let base = serve(router).await;

        let backend = probe_shared_port(&prober(), &base).await.unwrap();
        assert_eq!(backend.engine, Engine::OpenaiCompat);
    }

    #[tokio::test]
    async fn test_shared_port_server_header_hint() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async {
                (
                    [(header::SERVER, "vllm/0.6")],
                    Json(json!({ "data": [{ "id": "m" }] })),
                )
            }),
        );
        let base = serve(router).await;

        let backend = probe_shared_port(&prober(), &base).await.unwrap();
        assert_eq!(backend.engine, Engine::Vllm);
    }

    #[tokio::test]
    async fn test_probe_engine_requires_matching_shape() {
        let router = Router::new().route(
            "/api/tags",
            get(|| async { Json(json!({ "unexpected": true })) }),
        );
        let base = serve(router).await;
        let ollama = spec_for(Engine::Ollama).unwrap();

        assert!(probe_engine(&prober(), ollama, &base).await.is_none());
    }

    #[tokio::test]
    async fn test_probe_engine_falls_through_to_second_endpoint() {
        let router = Router::new().route(
            "/v1/models",
            get(|| async { Json(json!({ "data": [{ "id": "exl2-model" }] })) }),
        );
        let base = serve(router).await;
        let tabby = spec_for(Engine::Tabbyapi).unwrap();

        let backend = probe_engine(&prober(), tabby, &base).await.unwrap();
        assert_eq!(backend.engine, Engine::Tabbyapi);
        assert_eq!(backend.models, vec!["exl2-model"]);
    }
}
