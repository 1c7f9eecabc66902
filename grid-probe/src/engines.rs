//! Capability table of known inference engines
//!
//! One record per engine lists where it listens by default, which endpoints
//! identify it, how to list its models and how to recover its context
//! window. Probing code iterates this table instead of branching on names.
//!
//! | Engine    | Port  | Identifying endpoints                 |
//! |-----------|-------|---------------------------------------|
//! | Ollama    | 11434 | `/api/tags`, `/api/version`           |
//! | vLLM      | 8000  | `/version`, `/v1/models`              |
//! | LM Studio | 1234  | `/v1/models`                          |
//! | SGLang    | 30000 | `/get_model_info`, `/v1/models`       |
//! | LMDeploy  | 23333 | `/v1/models`                          |
//! | TGI       | 8080  | `/info`                               |
//! | KoboldCpp | 5001  | `/api/v1/model`                       |
//! | TabbyAPI  | 5000  | `/v1/model`, `/v1/models`             |

use grid_core::domain::backend::Engine;

use crate::extract;
use serde_json::Value;

/// Port several engines default to; needs disambiguation
pub const SHARED_PORT: u16 = 8000;

/// Engines with an endpoint unique enough to tell them apart on the shared
/// port, in the order they are tried
pub const SHARED_PORT_CANDIDATES: &[Engine] = &[Engine::Vllm, Engine::Sglang];

/// Expected body shape of a probe endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{"models": [{"name": ...}]}`
    OllamaTags,
    /// `{"data": [{"id": ...}]}`
    OpenAiList,
    /// An object carrying the named field; a string value is the model id
    ModelField(&'static str),
    /// `{"version": ...}`
    Version,
}

/// Models and version recovered from a matching probe body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matched {
    pub models: Vec<String>,
    pub version: Option<String>,
}

impl Shape {
    /// Returns what the body tells us if it has this shape
    pub fn extract(&self, body: &Value) -> Option<Matched> {
        match self {
            Shape::OllamaTags => Some(Matched {
                models: extract::ollama_models(body)?,
                version: None,
            }),
            Shape::OpenAiList => Some(Matched {
                models: extract::openai_models(body)?,
                version: None,
            }),
            Shape::ModelField(field) => {
                let value = body.as_object()?.get(*field)?;
                let models = value
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(|s| vec![s.to_string()])
                    .unwrap_or_default();
                Some(Matched {
                    models,
                    version: extract::version_of(body),
                })
            }
            Shape::Version => {
                body.as_object()?.get("version")?;
                Some(Matched {
                    models: Vec::new(),
                    version: extract::version_of(body),
                })
            }
        }
    }
}

/// A GET endpoint together with the shape its body must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub shape: Shape,
}

/// The generic OpenAI-compatible model listing
pub const OPENAI_MODELS: Endpoint = Endpoint {
    path: "/v1/models",
    shape: Shape::OpenAiList,
};

/// How an engine exposes its maximum context window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRule {
    /// `POST /api/show {"name": model}` then `model_info.<arch>.context_length`
    OllamaShow,
    /// `GET path` then a top-level numeric field
    InfoField {
        path: &'static str,
        field: &'static str,
    },
    /// `GET /api/extra/true_max_context_length`: a bare number or `{"value": n}`
    KoboldMax,
    /// `GET /api/v1/models` (LM Studio native API), loaded instance first
    LmStudioNative,
    /// `GET /v1/models` then `data[].max_model_len`
    OpenAiModelLen,
}

/// Everything the probe knows about one engine
#[derive(Debug, Clone, Copy)]
pub struct EngineSpec {
    pub engine: Engine,
    pub default_port: u16,
    /// Endpoints tried in order when scanning the default port
    pub probes: &'static [Endpoint],
    /// Endpoint unique to this engine, used to classify an arbitrary URL
    pub signature: Option<Endpoint>,
    /// Separate version endpoint, if the engine has one
    pub version_path: Option<&'static str>,
    /// Endpoint that lists the engine's models
    pub models: Endpoint,
    pub context: ContextRule,
}

/// Known engines, in identification priority order
pub const ENGINES: &[EngineSpec] = &[
    EngineSpec {
        engine: Engine::Ollama,
        default_port: 11434,
        probes: &[Endpoint {
            path: "/api/tags",
            shape: Shape::OllamaTags,
        }],
        signature: Some(Endpoint {
            path: "/api/tags",
            shape: Shape::OllamaTags,
        }),
        version_path: Some("/api/version"),
        models: Endpoint {
            path: "/api/tags",
            shape: Shape::OllamaTags,
        },
        context: ContextRule::OllamaShow,
    },
    EngineSpec {
        engine: Engine::Vllm,
        default_port: 8000,
        probes: &[
            Endpoint {
                path: "/version",
                shape: Shape::Version,
            },
            OPENAI_MODELS,
        ],
        signature: Some(Endpoint {
            path: "/version",
            shape: Shape::Version,
        }),
        version_path: None,
        models: OPENAI_MODELS,
        context: ContextRule::OpenAiModelLen,
    },
    EngineSpec {
        engine: Engine::Lmstudio,
        default_port: 1234,
        probes: &[OPENAI_MODELS],
        signature: None,
        version_path: None,
        models: OPENAI_MODELS,
        context: ContextRule::LmStudioNative,
    },
    EngineSpec {
        engine: Engine::Sglang,
        default_port: 30000,
        probes: &[
            Endpoint {
                path: "/get_model_info",
                shape: Shape::ModelField("model_path"),
            },
            OPENAI_MODELS,
        ],
        signature: Some(Endpoint {
            path: "/get_model_info",
            shape: Shape::ModelField("model_path"),
        }),
        version_path: None,
        models: OPENAI_MODELS,
        context: ContextRule::InfoField {
            path: "/get_model_info",
            field: "context_length",
        },
    },
    EngineSpec {
        engine: Engine::Lmdeploy,
        default_port: 23333,
        probes: &[OPENAI_MODELS],
        signature: None,
        version_path: None,
        models: OPENAI_MODELS,
        context: ContextRule::OpenAiModelLen,
    },
    EngineSpec {
        engine: Engine::Tgi,
        default_port: 8080,
        probes: &[Endpoint {
            path: "/info",
            shape: Shape::ModelField("model_id"),
        }],
        signature: Some(Endpoint {
            path: "/info",
            shape: Shape::ModelField("model_id"),
        }),
        version_path: None,
        models: Endpoint {
            path: "/info",
            shape: Shape::ModelField("model_id"),
        },
        context: ContextRule::InfoField {
            path: "/info",
            field: "max_total_tokens",
        },
    },
    EngineSpec {
        engine: Engine::Koboldcpp,
        default_port: 5001,
        probes: &[Endpoint {
            path: "/api/v1/model",
            shape: Shape::ModelField("result"),
        }],
        signature: Some(Endpoint {
            path: "/api/v1/model",
            shape: Shape::ModelField("result"),
        }),
        version_path: None,
        models: Endpoint {
            path: "/api/v1/model",
            shape: Shape::ModelField("result"),
        },
        context: ContextRule::KoboldMax,
    },
    EngineSpec {
        engine: Engine::Tabbyapi,
        default_port: 5000,
        probes: &[
            Endpoint {
                path: "/v1/model",
                shape: Shape::ModelField("id"),
            },
            OPENAI_MODELS,
        ],
        signature: None,
        version_path: None,
        models: OPENAI_MODELS,
        context: ContextRule::OpenAiModelLen,
    },
];

/// Looks up the table record for an engine
pub fn spec_for(engine: Engine) -> Option<&'static EngineSpec> {
    ENGINES.iter().find(|spec| spec.engine == engine)
}
