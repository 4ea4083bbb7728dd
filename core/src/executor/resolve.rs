//! `"@<stepId>.<dotted.path>"` reference resolution.
//!
//! Resolution never fails: a reference to a failed producer becomes a
//! `{failed: true, ...}` sentinel, an unknown or not-yet-finished producer a
//! `{missing: true, ...}` sentinel, and traversal through a non-object ends
//! in `null`. The consuming step is still attempted with whatever came out.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::executor::types::LayerResult;

const REF_PREFIX: char = '@';
const RESULT_FIELDS: [&str; 4] = ["success", "data", "error", "metadata"];

/// Parsed form of a reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef<'a> {
    pub step_id: &'a str,
    pub path: Vec<&'a str>,
}

impl<'a> StepRef<'a> {
    pub fn parse(raw: &'a str) -> Option<Self> {
        let body = raw.strip_prefix(REF_PREFIX)?;
        if body.is_empty() {
            return None;
        }
        let mut parts = body.split('.');
        let step_id = parts.next()?;
        Some(Self {
            step_id,
            path: parts.filter(|p| !p.is_empty()).collect(),
        })
    }
}

/// Merge workflow-level input data into a step's input; the step's own keys win.
pub fn merge_defaults(input: &Map<String, Value>, defaults: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (k, v) in input {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Resolve every reference inside `input`, recursing into arrays and objects.
pub fn resolve_input(
    input: &Map<String, Value>,
    results: &BTreeMap<String, LayerResult>,
) -> Map<String, Value> {
    input
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, results)))
        .collect()
}

pub fn resolve_value(value: &Value, results: &BTreeMap<String, LayerResult>) -> Value {
    match value {
        Value::String(s) => match StepRef::parse(s) {
            Some(reference) => resolve_ref(&reference, results),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, results)).collect()),
        Value::Object(map) => Value::Object(resolve_input(map, results)),
        _ => value.clone(),
    }
}

/// Ids referenced anywhere in `input`.
pub fn referenced_steps(input: &Map<String, Value>) -> Vec<String> {
    let mut ids = Vec::new();
    for value in input.values() {
        collect_refs(value, &mut ids);
    }
    ids.sort();
    ids.dedup();
    ids
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(r) = StepRef::parse(s) {
                out.push(r.step_id.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

fn resolve_ref(reference: &StepRef<'_>, results: &BTreeMap<String, LayerResult>) -> Value {
    let Some(result) = results.get(reference.step_id) else {
        return json!({
            "missing": true,
            "stepId": reference.step_id,
            "hint": format!(
                "step '{}' has no result yet; declare it in dependsOn or check the id",
                reference.step_id
            ),
        });
    };

    if !result.is_effective_success() {
        return json!({
            "failed": true,
            "stepId": reference.step_id,
            "error": result.error.clone().unwrap_or_else(|| "step returned no usable data".to_string()),
        });
    }

    let data = result.data.clone().unwrap_or(Value::Null);
    let Some(first) = reference.path.first() else {
        return data;
    };

    // Paths naming a result field walk the whole result; anything else walks `data`.
    let (root, path) = if RESULT_FIELDS.contains(first) {
        (serde_json::to_value(result).unwrap_or(Value::Null), &reference.path[..])
    } else {
        (data, &reference.path[..])
    };
    traverse(root, path)
}

fn traverse(mut current: Value, path: &[&str]) -> Value {
    for segment in path {
        current = match current {
            Value::Object(mut map) => map.remove(*segment).unwrap_or(Value::Null),
            _ => return Value::Null,
        };
    }
    current
}
