//! LLM client: the single point of entry for all upstream model calls.
//!
//! Handlers depend on the [`ChatProvider`] trait, never on the Gemini wire format.
//! Role relabeling and history/turn splitting happen here, at the adapter boundary.
//!
//! Model: gemini-3-flash-preview (hardcoded, not configurable to prevent drift)

use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::chat::models::{ChatMessage, Role};

#[cfg(test)]
pub mod mock;
pub mod quota;
pub mod sse;

/// The model used for every chat request.
pub const MODEL: &str = "gemini-3-flash-preview";
const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Quota exceeded (retry after {retry_after_secs}s): {message}")]
    Quota { retry_after_secs: u64, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Conversation has no messages")]
    EmptyConversation,
}

/// Incremental text produced by the upstream, in the order it was generated.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamRole {
    User,
    Model,
}

/// Upstream naming for conversation roles: our `assistant` is the upstream's `model`.
pub fn to_upstream_role(role: Role) -> UpstreamRole {
    match role {
        Role::User => UpstreamRole::User,
        Role::Assistant => UpstreamRole::Model,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamContent {
    pub role: UpstreamRole,
    pub text: String,
}

/// One upstream call: prior turns as history plus the newest turn to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub system_instruction: String,
    pub history: Vec<UpstreamContent>,
    pub message: String,
}

/// Splits a validated conversation into history (all but the last) and the new turn (the last).
pub fn build_upstream_request(
    system_instruction: &str,
    messages: &[ChatMessage],
) -> Result<UpstreamRequest, LlmError> {
    let (last, earlier) = messages.split_last().ok_or(LlmError::EmptyConversation)?;

    Ok(UpstreamRequest {
        system_instruction: system_instruction.to_string(),
        history: earlier
            .iter()
            .map(|m| UpstreamContent {
                role: to_upstream_role(m.role),
                text: m.content.clone(),
            })
            .collect(),
        message: last.content.clone(),
    })
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Opens a streaming completion. Resolves once the upstream has accepted the request;
    /// failures after that point arrive as items of the returned stream.
    async fn stream_chat(&self, request: UpstreamRequest) -> Result<TextStream, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini wire format
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<UpstreamRole>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a UpstreamRequest) -> Self {
        let mut contents: Vec<GeminiContent<'a>> = request
            .history
            .iter()
            .map(|c| GeminiContent {
                role: Some(c.role),
                parts: vec![GeminiPart { text: &c.text }],
            })
            .collect();
        contents.push(GeminiContent {
            role: Some(UpstreamRole::User),
            parts: vec![GeminiPart {
                text: &request.message,
            }],
        });

        Self {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: &request.system_instruction,
                }],
            },
            contents,
        }
    }
}

/// Streaming client for the Gemini `streamGenerateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, MODEL
        )
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn stream_chat(&self, request: UpstreamRequest) -> Result<TextStream, LlmError> {
        let body = GenerateContentRequest::from_request(&request);

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(quota::classify_error_response(status.as_u16(), &body));
        }

        debug!(
            "Upstream stream opened: model={}, history_len={}",
            MODEL,
            request.history.len()
        );

        Ok(sse::text_stream(response.bytes_stream()))
    }
}
