//! Backend domain types
//!
//! Describes a local inference engine as discovered by the backend probe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known inference engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    Ollama,
    Vllm,
    Lmstudio,
    Sglang,
    Lmdeploy,
    Tgi,
    Koboldcpp,
    Tabbyapi,
    OpenaiCompat,
    Unknown,
}

impl Engine {
    /// Identifier used in configuration and on the wire
    pub fn id(&self) -> &'static str {
        match self {
            Engine::Ollama => "ollama",
            Engine::Vllm => "vllm",
            Engine::Lmstudio => "lmstudio",
            Engine::Sglang => "sglang",
            Engine::Lmdeploy => "lmdeploy",
            Engine::Tgi => "tgi",
            Engine::Koboldcpp => "koboldcpp",
            Engine::Tabbyapi => "tabbyapi",
            Engine::OpenaiCompat => "openai-compat",
            Engine::Unknown => "unknown",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Engine::Ollama => "Ollama",
            Engine::Vllm => "vLLM",
            Engine::Lmstudio => "LM Studio",
            Engine::Sglang => "SGLang",
            Engine::Lmdeploy => "LMDeploy",
            Engine::Tgi => "TGI",
            Engine::Koboldcpp => "KoboldCpp",
            Engine::Tabbyapi => "TabbyAPI",
            Engine::OpenaiCompat => "OpenAI-compatible",
            Engine::Unknown => "Unknown",
        }
    }

    /// API dialect used for chat completions
    pub fn dialect(&self) -> ApiDialect {
        match self {
            Engine::Ollama => ApiDialect::Native,
            _ => ApiDialect::OpenAi,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Engine::Ollama),
            "vllm" => Ok(Engine::Vllm),
            "lmstudio" | "lm-studio" => Ok(Engine::Lmstudio),
            "sglang" => Ok(Engine::Sglang),
            "lmdeploy" => Ok(Engine::Lmdeploy),
            "tgi" => Ok(Engine::Tgi),
            "koboldcpp" => Ok(Engine::Koboldcpp),
            "tabbyapi" => Ok(Engine::Tabbyapi),
            "openai-compat" | "openai" => Ok(Engine::OpenaiCompat),
            "unknown" => Ok(Engine::Unknown),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// API dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiDialect {
    /// Engine-native API (Ollama)
    Native,
    /// OpenAI-compatible `/v1/models` + `/v1/chat/completions`
    #[serde(rename = "openai")]
    OpenAi,
}

/// A detected inference backend
///
/// Created by the probe and read-only afterwards. Probes never cache,
/// so every scan produces fresh descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub engine: Engine,
    pub name: String,
    pub url: String,
    pub dialect: ApiDialect,
    pub models: Vec<String>,
    pub version: Option<String>,
}

impl BackendDescriptor {
    /// Creates a descriptor with no models or version yet
    pub fn new(engine: Engine, url: impl Into<String>) -> Self {
        Self {
            engine,
            name: engine.display_name().to_string(),
            url: url.into(),
            dialect: engine.dialect(),
            models: Vec::new(),
            version: None,
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_round_trips_through_id() {
        for engine in [
            Engine::Ollama,
            Engine::Vllm,
            Engine::Lmstudio,
            Engine::Sglang,
            Engine::Lmdeploy,
            Engine::Tgi,
            Engine::Koboldcpp,
            Engine::Tabbyapi,
            Engine::OpenaiCompat,
            Engine::Unknown,
        ] {
            assert_eq!(engine.id().parse::<Engine>(), Ok(engine));
            let json = serde_json::to_string(&engine).unwrap();
            assert_eq!(json, format!("\"{}\"", engine.id()));
        }
    }

    #[test]
    fn test_only_ollama_is_native() {
        assert_eq!(Engine::Ollama.dialect(), ApiDialect::Native);
        assert_eq!(Engine::Vllm.dialect(), ApiDialect::OpenAi);
        assert_eq!(Engine::Unknown.dialect(), ApiDialect::OpenAi);
    }

    #[test]
    fn test_descriptor_defaults_from_engine() {
        let backend = BackendDescriptor::new(Engine::Tgi, "http://127.0.0.1:8080");
        assert_eq!(backend.name, "TGI");
        assert_eq!(backend.dialect, ApiDialect::OpenAi);
        assert!(backend.models.is_empty());
    }
}
