//! Classification of non-success upstream responses.
//!
//! The retry delay is scraped from the upstream's free-text message when it says
//! "retry in Ns". That format is not a contract, so a structured `RetryInfo` detail
//! and then a fixed fallback are used when it is missing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::LlmError;

/// Retry hint used when the upstream gives none we can read.
pub const DEFAULT_QUOTA_RETRY_SECS: u64 = 60;

static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in\s+(\d+(?:\.\d+)?)\s*s").expect("Failed to compile retry delay regex")
});

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

/// Maps an upstream error status and body to an [`LlmError`].
/// HTTP 429 or a `RESOURCE_EXHAUSTED` status is a quota error; everything else is an API error.
pub fn classify_error_response(status: u16, body: &str) -> LlmError {
    let parsed = serde_json::from_str::<GoogleErrorEnvelope>(body).ok();

    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    let exhausted = parsed
        .as_ref()
        .and_then(|e| e.error.status.as_deref())
        .is_some_and(|s| s == "RESOURCE_EXHAUSTED");

    if status == 429 || exhausted {
        let retry_after_secs = parse_retry_delay(&message)
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|e| retry_info_delay(&e.error.details))
            })
            .unwrap_or(DEFAULT_QUOTA_RETRY_SECS);
        return LlmError::Quota {
            retry_after_secs,
            message,
        };
    }

    LlmError::Api { status, message }
}

/// Extracts the delay from text like "Please retry in 23.45s.", rounded up to whole seconds.
pub fn parse_retry_delay(message: &str) -> Option<u64> {
    let captures = RETRY_IN.captures(message)?;
    seconds_from_str(captures.get(1)?.as_str())
}

/// Reads `retryDelay` (e.g. `"23s"`) from a `google.rpc.RetryInfo` error detail.
fn retry_info_delay(details: &[Value]) -> Option<u64> {
    details
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.ends_with("RetryInfo"))
        })
        .find_map(|d| d.get("retryDelay").and_then(Value::as_str))
        .and_then(|raw| seconds_from_str(raw.trim_end_matches('s')))
}

fn seconds_from_str(raw: &str) -> Option<u64> {
    let secs: f64 = raw.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs.ceil() as u64).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_delay_rounds_up() {
        assert_eq!(
            parse_retry_delay("Quota exceeded. Please retry in 23.45s."),
            Some(24)
        );
        assert_eq!(parse_retry_delay("please RETRY IN 7s"), Some(7));
    }

    #[test]
    fn test_parse_retry_delay_missing() {
        assert_eq!(parse_retry_delay("Resource has been exhausted"), None);
        assert_eq!(parse_retry_delay("retry in a moment"), None);
    }

    #[test]
    fn test_quota_from_message() {
        let body = r#"{"error":{"code":429,"message":"You exceeded your current quota. Please retry in 12.2s.","status":"RESOURCE_EXHAUSTED"}}"#;
        match classify_error_response(429, body) {
            LlmError::Quota {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 13),
            other => panic!("expected quota error, got {other:?}"),
        }
    }

    #[test]
    fn test_quota_from_retry_info_detail() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"31s"}]}}"#;
        match classify_error_response(429, body) {
            LlmError::Quota {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 31),
            other => panic!("expected quota error, got {other:?}"),
        }
    }

    #[test]
    fn test_quota_fallback_when_unparseable() {
        match classify_error_response(429, "Too Many Requests") {
            LlmError::Quota {
                retry_after_secs,
                message,
            } => {
                assert_eq!(retry_after_secs, DEFAULT_QUOTA_RETRY_SECS);
                assert_eq!(message, "Too Many Requests");
            }
            other => panic!("expected quota error, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_exhausted_with_other_status_is_quota() {
        let body = r#"{"error":{"code":403,"message":"Quota exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_error_response(403, body),
            LlmError::Quota { .. }
        ));
    }

    #[test]
    fn test_other_errors_are_api_errors() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        match classify_error_response(400, body) {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
