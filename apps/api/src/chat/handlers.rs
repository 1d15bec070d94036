//! Axum route handler for the chat gateway.

use anyhow::Context;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use tracing::{info, info_span, Instrument, Span};

use crate::chat::models::{CorrelationId, CORRELATION_ID_HEADER, RATE_LIMIT_REMAINING_HEADER};
use crate::chat::rate_limit::{client_key, RateLimitDecision};
use crate::chat::relay::relay;
use crate::chat::validation::parse_chat_request;
use crate::errors::AppError;
use crate::llm_client::build_upstream_request;
use crate::state::AppState;

/// POST /api/chat
///
/// Accepts `{ messages: [{ role, content }, ...] }` and streams the assistant's reply as
/// `text/plain`. Failures before streaming starts return a JSON error with a correlation id.
pub async fn handle_chat(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let client_key = client_key(&headers);
    let span = info_span!(
        "chat_request",
        correlation_id = %correlation_id,
        client_key = %client_key
    );

    async move {
        match process_chat(&state, &client_key, body, correlation_id).await {
            Ok(response) => response,
            Err(err) => err.with_correlation_id(correlation_id).into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn process_chat(
    state: &AppState,
    client_key: &str,
    body: Result<Bytes, BytesRejection>,
    correlation_id: CorrelationId,
) -> Result<Response, AppError> {
    let remaining = if state.config.rate_limit.enabled {
        match state.rate_limiter.check(client_key, Utc::now()).await? {
            RateLimitDecision::Allowed { remaining } => Some(remaining),
            RateLimitDecision::Limited { retry_after_secs } => {
                return Err(AppError::RateLimited { retry_after_secs });
            }
        }
    } else {
        None
    };

    let body = body.map_err(|rejection| AppError::InvalidJson(rejection.body_text()))?;
    let messages = parse_chat_request(&body, &state.config.chat_limits)?;

    let request = build_upstream_request(&state.system_instruction, &messages)?;
    info!(
        messages = messages.len(),
        "Dispatching conversation upstream"
    );

    let upstream = state.llm.stream_chat(request).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(CORRELATION_ID_HEADER, correlation_id.to_string());
    if let Some(remaining) = remaining {
        builder = builder.header(RATE_LIMIT_REMAINING_HEADER, remaining);
    }

    let response = builder
        .body(Body::from_stream(relay(upstream, Span::current())))
        .context("Failed to build streaming response")?;

    Ok(response)
}
