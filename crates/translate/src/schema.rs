//! Tool input-schema sanitization for the upstream aggregator.
//!
//! The aggregator rejects certain string formats the client dialect
//! routinely produces (notably `uri`). The sanitizer strips those wherever
//! they appear; it never validates and never introduces keys.

use serde_json::Value;

/// String formats the aggregator accepts and that are kept in place.
const KEPT_FORMATS: &[&str] = &["enum", "date-time"];

/// Recursively delete disallowed properties from a JSON-Schema fragment.
///
/// At every object node, `format` is removed when the sibling `type` is
/// `string` and the format value is not one of the kept formats. All
/// remaining values, including array elements, are visited.
pub fn sanitize(schema: &mut Value) {
    match schema {
        Value::Object(object) => {
            let is_string_node = object.get("type").and_then(Value::as_str) == Some("string");

            if is_string_node {
                let keep = object
                    .get("format")
                    .and_then(Value::as_str)
                    .is_some_and(|format| KEPT_FORMATS.contains(&format));

                if !keep && object.contains_key("format") {
                    object.remove("format");
                }
            }

            for value in object.values_mut() {
                sanitize(value);
            }
        }
        Value::Array(values) => {
            for value in values {
                sanitize(value);
            }
        }
        _ => {}
    }
}
