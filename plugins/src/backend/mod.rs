//! Concrete adapters behind the core `Backend` trait.
//!
//! Adapters only translate a `Task` into a call and the call's outcome into a
//! `LayerResult` or `BackendError`.

pub mod aiservice;
pub mod codecli;

pub use aiservice::AiStudioBackend;
pub use codecli::CodeCliBackend;

use serde_json::Value;
use tribridge_core::api::Task;

// Input keys already carried by `Task::prompt` or `Task::files`.
const CONSUMED_KEYS: [&str; 5] = ["prompt", "instructions", "query", "content", "files"];

/// Flatten a task into one text prompt: the action, the main prompt, then any
/// remaining step inputs as labelled sections.
pub fn compose_prompt(task: &Task) -> String {
    let mut out = String::new();
    if let Some(action) = task.action.as_deref().filter(|a| !a.is_empty()) {
        out.push_str(&format!("Task: {action}\n\n"));
    }
    out.push_str(task.prompt.trim());

    let main_key = CONSUMED_KEYS[..4]
        .iter()
        .find(|k| task.options.get(**k).and_then(Value::as_str) == Some(task.prompt.as_str()));

    for (key, value) in &task.options {
        if key == "files" || Some(&key.as_str()) == main_key {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Null => continue,
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        };
        out.push_str(&format!("\n\n## {key}\n{rendered}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn prompt_sections_skip_the_main_key() {
        let mut options = Map::new();
        options.insert("instructions".into(), json!("summarize"));
        options.insert("format".into(), json!("markdown"));
        options.insert("content".into(), json!({"text": "body"}));
        let task = Task {
            prompt: "summarize".into(),
            options,
            action: Some("convert".into()),
            ..Task::default()
        };

        let prompt = compose_prompt(&task);
        assert!(prompt.starts_with("Task: convert\n\nsummarize"));
        assert!(prompt.contains("## format\nmarkdown"));
        assert!(prompt.contains("## content\n{"));
        assert!(!prompt.contains("## instructions"));
    }
}
