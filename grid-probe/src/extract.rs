//! Field extraction from engine probe bodies
//!
//! Pure functions over `serde_json::Value`; nothing here touches the network.

use serde_json::Value;

/// Model names from an Ollama `/api/tags` body
///
/// The implicit `:latest` tag is dropped so names match what users type.
pub fn ollama_models(body: &Value) -> Option<Vec<String>> {
    let models = body.get("models")?.as_array()?;
    Some(
        models
            .iter()
            .filter_map(|m| m.get("name").and_then(Value::as_str))
            .map(|name| name.strip_suffix(":latest").unwrap_or(name))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Model ids from an OpenAI-style `{"data": [{"id": ...}]}` listing
pub fn openai_models(body: &Value) -> Option<Vec<String>> {
    let data = body.get("data")?.as_array()?;
    Some(
        data.iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// The `version` field as a string, whether sent as a string or a number
pub fn version_of(body: &Value) -> Option<String> {
    match body.get("version")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A positive count, accepting JSON numbers and numeric strings
pub fn as_count(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (n > 0).then_some(n)
}

/// Top-level numeric field
pub fn count_field(body: &Value, field: &str) -> Option<u64> {
    as_count(body.get(field)?)
}

/// Context window from an Ollama `/api/show` body
///
/// The key is architecture-specific (`llama.context_length`,
/// `qwen2.context_length`, ...), so any key with that suffix counts.
pub fn ollama_context(body: &Value) -> Option<u64> {
    body.get("model_info")?
        .as_object()?
        .iter()
        .filter(|(key, _)| key.ends_with(".context_length"))
        .find_map(|(_, value)| as_count(value))
}

/// KoboldCpp answers with either a bare number or `{"value": n}`
pub fn kobold_context(body: &Value) -> Option<u64> {
    as_count(body).or_else(|| count_field(body, "value"))
}

/// Context window from LM Studio's native `/api/v1/models`
///
/// Prefers the configured length of the first loaded instance, then the
/// model's advertised maximum. Without a model name the first entry wins.
pub fn lmstudio_context(body: &Value, model: Option<&str>) -> Option<u64> {
    let models = body.get("models")?.as_array()?;
    let entry = match model {
        Some(name) => models
            .iter()
            .find(|m| m.get("key").and_then(Value::as_str) == Some(name))?,
        None => models.first()?,
    };

    entry
        .get("loaded_instances")
        .and_then(Value::as_array)
        .and_then(|instances| instances.first())
        .and_then(|inst| inst.get("config"))
        .and_then(|config| count_field(config, "context_length"))
        .or_else(|| count_field(entry, "max_context_length"))
}

/// `max_model_len` from an OpenAI-style listing (vLLM, LMDeploy, TabbyAPI)
pub fn openai_context(body: &Value, model: Option<&str>) -> Option<u64> {
    let data = body.get("data")?.as_array()?;
    data.iter()
        .filter(|m| match model {
            Some(name) => m.get("id").and_then(Value::as_str) == Some(name),
            None => true,
        })
        .find_map(|m| count_field(m, "max_model_len"))
}
