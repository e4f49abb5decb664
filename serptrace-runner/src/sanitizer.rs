// serptrace-runner/src/sanitizer.rs
// ============================================================================
// Module: Log Sanitizer
// Description: Redacts sensitive fields from metadata before it is logged
//              or persisted as stage-log metadata.
// Purpose: Keep raw HTML/snippets and query strings out of logs and
//          persisted bookkeeping rows.
// Dependencies: serde_json, url
// ============================================================================

//! ## Overview
//! Recursively walks a [`serde_json::Value`], redacting string values under
//! known-sensitive keys and stripping the query/fragment from values under
//! known-URL keys. Traversal is cycle-safe via a depth bound: `serde_json`
//! values cannot contain true reference cycles, but deeply nested or
//! attacker-controlled input could otherwise recurse unbounded, so recursion
//! stops and returns the value unchanged past [`MAX_DEPTH`].

use serde_json::Map;
use serde_json::Value;

const REDACTED: &str = "[redacted]";
const SNIPPET_KEYS: [&str; 5] = ["snippet", "raw", "raw_html", "raw_html_path", "html"];
const BODY_KEY: &str = "body";
const URL_KEYS: [&str; 4] = ["url", "normalized_url", "link", "uri"];

/// Maximum recursion depth walked by [`sanitize`]. Chosen generously above
/// any realistic metadata shape produced by this pipeline's stages.
const MAX_DEPTH: usize = 64;

/// Sanitizes `value` in place, per the key-based redaction rules.
#[must_use]
pub fn sanitize(value: &Value) -> Value {
    sanitize_depth(value, 0)
}

fn sanitize_depth(value: &Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(map) => Value::Object(sanitize_object(map, depth)),
        Value::Array(items) => Value::Array(items.iter().map(|item| sanitize_depth(item, depth + 1)).collect()),
        other => other.clone(),
    }
}

fn sanitize_object(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let sanitized = if is_snippet_key(key) {
            redact_string(value)
        } else if is_url_key(key) {
            sanitize_url(value)
        } else if key == "error" {
            sanitize_error(value)
        } else {
            sanitize_depth(value, depth + 1)
        };
        out.insert(key.clone(), sanitized);
    }
    out
}

fn is_snippet_key(key: &str) -> bool {
    SNIPPET_KEYS.contains(&key) || key == BODY_KEY
}

fn is_url_key(key: &str) -> bool {
    URL_KEYS.contains(&key)
}

fn redact_string(value: &Value) -> Value {
    match value {
        Value::String(_) => Value::String(REDACTED.to_owned()),
        Value::Null => Value::Null,
        other => other.clone(),
    }
}

fn sanitize_url(value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            Value::String(parsed.to_string())
        }
        Err(_) => value.clone(),
    }
}

fn sanitize_error(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(2);
            if let Some(name) = map.get("name") {
                out.insert("name".to_owned(), name.clone());
            }
            if let Some(message) = map.get("message") {
                out.insert("message".to_owned(), message.clone());
            }
            Value::Object(out)
        }
        Value::String(message) => {
            let mut out = Map::with_capacity(1);
            out.insert("message".to_owned(), Value::String(message.clone()));
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn redacts_snippet_and_raw_html_fields() {
        let input = json!({"snippet": "secret text", "raw_html": "<html>", "title": "keep me"});
        let output = sanitize(&input);
        assert_eq!(output["snippet"], json!("[redacted]"));
        assert_eq!(output["raw_html"], json!("[redacted]"));
        assert_eq!(output["title"], json!("keep me"));
    }

    #[test]
    fn strips_query_and_fragment_from_url_fields() {
        let input = json!({"url": "https://example.com/page?token=abc#section"});
        let output = sanitize(&input);
        assert_eq!(output["url"], json!("https://example.com/page"));
    }

    #[test]
    fn non_url_strings_under_url_keys_pass_through() {
        let input = json!({"link": "not-a-url"});
        let output = sanitize(&input);
        assert_eq!(output["link"], json!("not-a-url"));
    }

    #[test]
    fn reduces_error_objects_to_name_and_message() {
        let input = json!({"error": {"name": "Timeout", "message": "took too long", "stack": "..."}});
        let output = sanitize(&input);
        assert_eq!(output["error"], json!({"name": "Timeout", "message": "took too long"}));
    }

    #[test]
    fn arrays_and_nested_objects_are_traversed() {
        let input = json!({"results": [{"snippet": "a"}, {"snippet": "b"}]});
        let output = sanitize(&input);
        assert_eq!(output["results"][0]["snippet"], json!("[redacted]"));
        assert_eq!(output["results"][1]["snippet"], json!("[redacted]"));
    }

    #[test]
    fn deeply_nested_values_stop_at_max_depth_without_panicking() {
        let mut value = json!("leaf");
        for _ in 0..(MAX_DEPTH + 10) {
            value = json!({"nested": value});
        }
        let _ = sanitize(&value);
    }
}
