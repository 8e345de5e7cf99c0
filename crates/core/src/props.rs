// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Node payload codec.
//!
//! A node's raw bytes carry a logical property mapping:
//!
//! - empty payload — empty mapping
//! - payload framed by `{`/`}` that parses as a JSON object — that object
//! - anything else — `{"string_value": <raw payload>}`
//!
//! Two key suffixes are reserved. A key ending in ` ->` is a node link
//! (the value is a target path, treated as a virtual child). A key ending
//! in ` =>` is a property link (the value is `<path> [<field>]`, a
//! property lookup on another node).

use serde_json::Value;
use tracing::error;

/// Decoded node payload: string keys to JSON values, sorted by key.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Key suffix marking a node link.
pub const NODE_LINK_SUFFIX: &str = " ->";

/// Key suffix marking a property link.
pub const PROP_LINK_SUFFIX: &str = " =>";

/// Decode raw node bytes into a property mapping.
///
/// Malformed JSON inside a `{...}` frame is logged and falls back to the
/// string-value form; decoding never fails.
pub fn decode(path: &str, raw: &[u8]) -> PropertyMap {
    let text = String::from_utf8_lossy(raw);
    let stripped = text.trim();
    if stripped.is_empty() {
        return PropertyMap::new();
    }
    if stripped.starts_with('{') && stripped.ends_with('}') {
        match serde_json::from_str::<Value>(stripped) {
            Ok(Value::Object(map)) => return map,
            Ok(_) | Err(_) => {
                error!(path = %path, "bad json data in node");
            }
        }
    }
    let mut map = PropertyMap::new();
    map.insert("string_value".to_string(), Value::String(text.into_owned()));
    map
}

/// Encode a property mapping onto raw node bytes.
///
/// The single-key `{"string_value": <string>}` form writes the bare
/// string; everything else is compact JSON.
pub fn encode(map: &PropertyMap) -> Vec<u8> {
    if map.is_empty() {
        return Vec::new();
    }
    if map.len() == 1 {
        if let Some(Value::String(s)) = map.get("string_value") {
            return s.as_bytes().to_vec();
        }
    }
    serde_json::to_string(&Value::Object(map.clone()))
        .unwrap_or_default()
        .into_bytes()
}

/// Render a property value the way export and diff reports spell it.
pub fn render_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// True when `key` names a node link.
pub fn is_node_link(key: &str) -> bool {
    key.ends_with(NODE_LINK_SUFFIX)
}

/// True when `key` names a property link.
pub fn is_prop_link(key: &str) -> bool {
    key.ends_with(PROP_LINK_SUFFIX)
}

/// True when `key` carries either link suffix.
pub fn is_link(key: &str) -> bool {
    is_node_link(key) || is_prop_link(key)
}

/// Strip a link suffix, if any, yielding the virtual name.
pub fn base_name(key: &str) -> &str {
    key.strip_suffix(NODE_LINK_SUFFIX)
        .or_else(|| key.strip_suffix(PROP_LINK_SUFFIX))
        .unwrap_or(key)
}

/// Split a property-link value into `(target-path, field)`.
///
/// The value is one or two whitespace-separated tokens; the field
/// defaults to `None` (callers fall back to the virtual property name).
/// Returns `None` for zero or more than two tokens.
pub fn parse_prop_link(value: &str) -> Option<(&str, Option<&str>)> {
    let mut tokens = value.split_whitespace();
    let target = tokens.next()?;
    let field = tokens.next();
    if tokens.next().is_some() {
        return None;
    }
    Some((target, field))
}

#[cfg(test)]
#[path = "props_tests.rs"]
mod tests;
