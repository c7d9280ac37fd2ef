//! Response-body normalization and error-message extraction.

use serde_json::{json, Value};

/// Turns a raw response body into JSON.
///
/// Non-JSON bodies (or JSON content types that fail to parse) become
/// `{"message": <text>}` so error extraction has something to show; an empty
/// body becomes `null`.
pub fn parse_body(content_type: Option<&str>, text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    let is_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    if is_json {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }

    json!({ "message": trimmed })
}

/// Extracts a human-readable message from an error body.
///
/// Preference: string `detail`, then a `detail` array of `{loc, msg}` items
/// rendered as `"<loc>: <msg>"` joined with `", "`, then string `message`,
/// then `"HTTP error <status>"`.
pub fn extract_error_message(body: &Value, status: u16) -> String {
    if let Some(detail) = body.get("detail") {
        if let Some(text) = detail.as_str().filter(|t| !t.trim().is_empty()) {
            return text.to_string();
        }
        if let Some(items) = detail.as_array() {
            let pairs: Vec<String> = items.iter().filter_map(validation_pair).collect();
            if !pairs.is_empty() {
                return pairs.join(", ");
            }
        }
    }

    if let Some(text) = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
    {
        return text.to_string();
    }

    format!("HTTP error {status}")
}

fn validation_pair(item: &Value) -> Option<String> {
    let msg = item.get("msg")?.as_str()?;
    let loc = match item.get("loc") {
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("."),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    if loc.is_empty() {
        Some(msg.to_string())
    } else {
        Some(format!("{loc}: {msg}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_detail_wins() {
        let body = json!({ "detail": "Email already registered", "message": "ignored" });
        assert_eq!(extract_error_message(&body, 400), "Email already registered");
    }

    #[test]
    fn test_validation_detail_array() {
        let body = json!({ "detail": [{ "loc": ["body", "email"], "msg": "invalid" }] });
        assert_eq!(extract_error_message(&body, 422), "body.email: invalid");
    }

    #[test]
    fn test_validation_detail_multiple_items_and_numeric_loc() {
        let body = json!({ "detail": [
            { "loc": ["body", "email"], "msg": "invalid" },
            { "loc": ["body", "items", 0], "msg": "required" }
        ]});
        assert_eq!(
            extract_error_message(&body, 422),
            "body.email: invalid, body.items.0: required"
        );
    }

    #[test]
    fn test_message_field_used_when_no_detail() {
        let body = json!({ "message": "Too many requests" });
        assert_eq!(extract_error_message(&body, 429), "Too many requests");
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(extract_error_message(&json!({}), 500), "HTTP error 500");
        assert_eq!(extract_error_message(&Value::Null, 502), "HTTP error 502");
        assert_eq!(
            extract_error_message(&json!({ "detail": [] }), 422),
            "HTTP error 422"
        );
    }

    #[test]
    fn test_parse_body_text_fallback() {
        let body = parse_body(Some("text/html"), "  Bad Gateway ");
        assert_eq!(body, json!({ "message": "Bad Gateway" }));
    }

    #[test]
    fn test_parse_body_broken_json_falls_back_to_text() {
        let body = parse_body(Some("application/json"), "{oops");
        assert_eq!(body, json!({ "message": "{oops" }));
    }

    #[test]
    fn test_parse_body_json_and_empty() {
        assert_eq!(
            parse_body(Some("application/json; charset=utf-8"), r#"{"ok":true}"#),
            json!({ "ok": true })
        );
        assert_eq!(parse_body(Some("application/json"), ""), Value::Null);
    }
}
