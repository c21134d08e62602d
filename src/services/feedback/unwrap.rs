//! Peels JSON out of strings. Grading payloads are sometimes a JSON object serialised into a
//! string, fenced in markdown, or wrapped twice.

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

pub const MAX_DEPTH: usize = 3;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid fence pattern"))
}

/// The decoded payload: at most one object and at most one free-text narrative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unwrapped {
    pub object: Option<Map<String, JsonValue>>,
    pub narrative: Option<String>,
}

/// Fenced block first, then the whole text, then the outermost `{...}` span.
pub fn parse_embedded(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(inner) = fence_regex().captures(trimmed).and_then(|c| c.get(1)) {
        candidates.push(inner.as_str().trim());
    }
    candidates.push(trimmed);
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }

    candidates
        .into_iter()
        .filter(|c| c.starts_with('{') || c.starts_with('[') || c.starts_with('"'))
        .find_map(|c| serde_json::from_str::<JsonValue>(c).ok())
}

pub fn unwrap_payload(raw: &JsonValue) -> Unwrapped {
    unwrap_at(raw.clone(), 0)
}

fn unwrap_at(value: JsonValue, depth: usize) -> Unwrapped {
    match value {
        JsonValue::Object(map) => Unwrapped {
            object: Some(expand_object(map, depth)),
            narrative: None,
        },
        JsonValue::String(text) => {
            if depth < MAX_DEPTH {
                if let Some(inner @ (JsonValue::Object(_) | JsonValue::String(_) | JsonValue::Array(_))) =
                    parse_embedded(&text)
                {
                    return unwrap_at(inner, depth + 1);
                }
            }
            let text = text.trim();
            Unwrapped {
                object: None,
                narrative: (!text.is_empty()).then(|| text.to_string()),
            }
        }
        JsonValue::Array(items) => {
            if let Some(first) = items.iter().find(|v| v.is_object()) {
                return unwrap_at(first.clone(), depth);
            }
            let lines: Vec<&str> = items.iter().filter_map(|v| v.as_str()).map(str::trim).collect();
            let joined = lines.join("\n");
            Unwrapped {
                object: None,
                narrative: (!joined.trim().is_empty()).then_some(joined),
            }
        }
        _ => Unwrapped::default(),
    }
}

/// Replaces string fields that hold an embedded object with the decoded object.
fn expand_object(map: Map<String, JsonValue>, depth: usize) -> Map<String, JsonValue> {
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::String(text) if depth < MAX_DEPTH => match parse_embedded(&text) {
                    Some(JsonValue::Object(inner)) => JsonValue::Object(expand_object(inner, depth + 1)),
                    _ => JsonValue::String(text),
                },
                JsonValue::Object(inner) => JsonValue::Object(expand_object(inner, depth)),
                other => other,
            };
            (key, value)
        })
        .collect()
}
