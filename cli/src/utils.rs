use serde_json::{Map, Value};
use tribridge_core::api::CliError;

/// Prompt from `--prompt` or `--prompt-file`.
pub fn read_prompt(prompt: Option<&str>, prompt_file: Option<&str>) -> Result<String, CliError> {
    match (prompt, prompt_file) {
        (Some(p), _) => Ok(p.to_string()),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?.trim_end().to_string()),
        (None, None) => Err(CliError::Command(
            "either --prompt or --prompt-file is required".to_string(),
        )),
    }
}

/// Parse repeated `KEY=VALUE` flags. Values that parse as JSON keep their
/// type; anything else is a string.
pub fn parse_options(pairs: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut out = Map::new();
    for (idx, raw) in pairs.iter().enumerate() {
        let (k, v) = raw.split_once('=').ok_or_else(|| {
            CliError::Command(format!(
                "invalid --option #{} '{}' (expected KEY=VALUE)",
                idx + 1,
                raw
            ))
        })?;
        let key = k.trim();
        if key.is_empty() {
            return Err(CliError::Command(format!(
                "invalid --option #{} (empty key)",
                idx + 1
            )));
        }
        let value = serde_json::from_str::<Value>(v.trim())
            .unwrap_or_else(|_| Value::String(v.trim().to_string()));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

/// Read a JSON file that must hold an object.
pub fn read_json_object(path: &str) -> Result<Map<String, Value>, CliError> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Command(format!(
            "{path}: expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
