// src/utils.rs
use rmcp::model::CallToolResult;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::DraftsError;

/// Wrap serializable data as a structured tool result.
pub fn structured_result_with_text<T: Serialize>(
    data: &T,
    _text_fallback: Option<String>,
) -> Result<CallToolResult, DraftsError> {
    let value = serde_json::to_value(data).map_err(DraftsError::SerdeJson)?;

    // Convert to an object map; if it's not an object, wrap under a `data` key.
    let map: JsonMap<String, JsonValue> = match value {
        JsonValue::Object(m) => m,
        other => {
            let mut m = JsonMap::new();
            m.insert("data".to_string(), other);
            m
        }
    };

    Ok(CallToolResult {
        content: Vec::new(),
        structured_content: Some(JsonValue::Object(map)),
        is_error: Some(false),
        meta: None,
    })
}

/// Split a comma-separated tag list, trimming whitespace and dropping empties.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Coerce the `"true"`/`"false"` strings callbacks echo for boolean flags.
pub fn parse_bool_flag(raw: &str) -> bool {
    matches!(raw.trim(), "true" | "TRUE" | "True" | "1" | "yes")
}
