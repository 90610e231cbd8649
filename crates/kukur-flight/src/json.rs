//! JSON request/response shapes for the Action-mode control plane (§4.7).
//!
//! Request bodies are `{source, name?, tags?, field?}`, where `name` is
//! sugar for a `"series name"` tag — distinct from [`kukur_core::Metadata`]'s
//! own wire shape (which nests a full `series` object). Response items for
//! bare selectors mirror the request shape.

use std::collections::BTreeMap;

use kukur_core::{KukurError, Result, SeriesSelector, SourceStructure, DEFAULT_FIELD, SERIES_NAME_TAG};
use serde_json::Value;

pub fn selector_from_request(value: &Value) -> Result<SeriesSelector> {
    let source = value
        .get("source")
        .and_then(Value::as_str)
        .ok_or_else(|| KukurError::InvalidData("request is missing \"source\"".to_string()))?
        .to_string();

    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    if let Some(name) = value.get("name").and_then(Value::as_str) {
        tags.insert(SERIES_NAME_TAG.to_string(), name.to_string());
    }
    if let Some(Value::Object(map)) = value.get("tags") {
        for (k, v) in map {
            if let Some(v) = v.as_str() {
                tags.insert(k.clone(), v.to_string());
            }
        }
    }

    let field = value
        .get("field")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_FIELD)
        .to_string();

    Ok(SeriesSelector { source, tags, field })
}

/// `{source, name, field?}` when the only tag is the series name;
/// `{source, tags, field?}` otherwise.
pub fn selector_to_response(selector: &SeriesSelector) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("source".to_string(), Value::String(selector.source.clone()));

    let extra_tags: BTreeMap<&String, &String> = selector
        .tags
        .iter()
        .filter(|(k, _)| k.as_str() != SERIES_NAME_TAG)
        .collect();

    if extra_tags.is_empty() {
        if let Some(name) = selector.name() {
            map.insert("name".to_string(), Value::String(name.to_string()));
        }
    } else {
        let tags: serde_json::Map<String, Value> = selector
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert("tags".to_string(), Value::Object(tags));
    }

    if selector.field != DEFAULT_FIELD {
        map.insert("field".to_string(), Value::String(selector.field.clone()));
    }
    Value::Object(map)
}

pub fn source_structure_to_response(structure: &SourceStructure) -> Value {
    serde_json::json!({
        "tag_keys": structure.tag_keys,
        "tag_values": structure.tag_values.iter().map(|(k, v)| serde_json::json!([k, v])).collect::<Vec<_>>(),
        "fields": structure.fields,
    })
}
