use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref TAG_REGEX: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref SCRIPT_REGEX: Regex =
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)\s*>").unwrap();
}

/// Strips markup from a single string.
///
/// `<script>`/`<style>` blocks are dropped with their content, any other tag is
/// removed and the text between tags is kept. Leftover angle brackets are removed
/// and the result is trimmed.
pub fn sanitize_input(input: &str) -> String {
    let without_scripts = SCRIPT_REGEX.replace_all(input, "");
    let without_tags = TAG_REGEX.replace_all(&without_scripts, "");
    without_tags.replace(['<', '>'], "").trim().to_string()
}

/// Recursively sanitizes every string in a JSON document, object keys included.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_input(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_input(&k), sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}
