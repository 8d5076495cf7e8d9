//! HTTP error mapping utilities

use crate::providers::error::{truncate_body, ProviderError};
use reqwest::StatusCode;
use serde_json::Value;

/// Map a non-success status and its body to a ProviderError
pub fn map_http_error(status: StatusCode, body: Option<String>) -> ProviderError {
    let message = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_message(&v))
        .or_else(|| {
            body.as_deref()
                .filter(|b| !b.trim().is_empty())
                .map(truncate_body)
        })
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));

    ProviderError::Status { status, message }
}

/// Extract a provider error message from a JSON error body
pub fn extract_error_message(json: &Value) -> Option<String> {
    // OpenAI / Anthropic format: { "error": { "message": "...", "type": "..." } }
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
    {
        return Some(message.to_string());
    }

    // Generic format: { "message": "...", "code": "..." }
    if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
        return Some(match json.get("code").and_then(code_text) {
            Some(code) => format!("{}: {}", code, message),
            None => message.to_string(),
        });
    }

    if let Some(error) = json.get("error").and_then(|v| v.as_str()) {
        return Some(error.to_string());
    }

    None
}

/// Text of a numeric or string code field
pub fn code_text(code: &Value) -> Option<String> {
    match code {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
