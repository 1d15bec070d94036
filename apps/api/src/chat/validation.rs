//! Parsing and schema validation for the chat request body.
//!
//! Parsing and validation are separate steps so that a malformed body is reported as
//! `INVALID_JSON` and a well-formed body with the wrong shape as `VALIDATION_ERROR`.

use serde::Serialize;
use serde_json::Value;

use crate::chat::models::{ChatMessage, Role};
use crate::config::ChatLimits;
use crate::errors::AppError;

/// A single violated constraint, addressed by dotted path (e.g. `messages.2.content`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Parses the raw body as JSON without looking at its shape.
pub fn parse_body(body: &[u8]) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::InvalidJson(e.to_string()))
}

/// Validates `{ messages: [...] }` against the configured limits.
/// Collects every violation rather than stopping at the first.
pub fn validate_messages(
    body: &Value,
    limits: &ChatLimits,
) -> Result<Vec<ChatMessage>, Vec<FieldViolation>> {
    let Some(object) = body.as_object() else {
        return Err(vec![FieldViolation::new(
            "body",
            "Expected a JSON object",
        )]);
    };

    let items = match object.get("messages") {
        None | Some(Value::Null) => {
            return Err(vec![FieldViolation::new("messages", "Required")]);
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(vec![FieldViolation::new("messages", "Expected an array")]);
        }
    };

    let mut violations = Vec::new();

    if items.is_empty() {
        violations.push(FieldViolation::new(
            "messages",
            "Must contain at least 1 message",
        ));
    }
    if items.len() > limits.max_messages {
        violations.push(FieldViolation::new(
            "messages",
            format!("Must contain at most {} messages", limits.max_messages),
        ));
    }

    let mut messages = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match validate_message(index, item, limits) {
            Ok(message) => messages.push(message),
            Err(mut errs) => violations.append(&mut errs),
        }
    }

    if violations.is_empty() {
        Ok(messages)
    } else {
        Err(violations)
    }
}

fn validate_message(
    index: usize,
    item: &Value,
    limits: &ChatLimits,
) -> Result<ChatMessage, Vec<FieldViolation>> {
    let path = format!("messages.{index}");
    let Some(object) = item.as_object() else {
        return Err(vec![FieldViolation::new(path, "Expected an object")]);
    };

    let mut violations = Vec::new();

    let role = match object.get("role") {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(format!("{path}.role"), "Required"));
            None
        }
        Some(Value::String(raw)) => {
            let parsed = Role::parse(raw);
            if parsed.is_none() {
                violations.push(FieldViolation::new(
                    format!("{path}.role"),
                    format!("Invalid value '{raw}', expected 'user' or 'assistant'"),
                ));
            }
            parsed
        }
        Some(_) => {
            violations.push(FieldViolation::new(
                format!("{path}.role"),
                "Expected 'user' or 'assistant'",
            ));
            None
        }
    };

    let content = match object.get("content") {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(format!("{path}.content"), "Required"));
            None
        }
        Some(Value::String(text)) => {
            let length = text.chars().count();
            if length == 0 {
                violations.push(FieldViolation::new(
                    format!("{path}.content"),
                    "Message cannot be empty",
                ));
                None
            } else if length > limits.max_message_length {
                violations.push(FieldViolation::new(
                    format!("{path}.content"),
                    format!(
                        "Message must be at most {} characters",
                        limits.max_message_length
                    ),
                ));
                None
            } else {
                Some(text.clone())
            }
        }
        Some(_) => {
            violations.push(FieldViolation::new(
                format!("{path}.content"),
                "Expected a string",
            ));
            None
        }
    };

    match (role, content) {
        (Some(role), Some(content)) if violations.is_empty() => Ok(ChatMessage { role, content }),
        _ => Err(violations),
    }
}

/// Joins violations into the single human-readable message returned to the client.
pub fn describe_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.path, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse then validate; the whole pre-dispatch input pipeline.
pub fn parse_chat_request(body: &[u8], limits: &ChatLimits) -> Result<Vec<ChatMessage>, AppError> {
    let value = parse_body(body)?;
    validate_messages(&value, limits)
        .map_err(|violations| AppError::Validation(describe_violations(&violations)))
}
