use std::sync::Arc;

use crate::chat::rate_limit::RateLimitStore;
use crate::config::Config;
use crate::llm_client::ChatProvider;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Upstream text generation. Default: GeminiClient.
    pub llm: Arc<dyn ChatProvider>,
    /// Per-client request counters. Default: InMemoryRateLimitStore.
    pub rate_limiter: Arc<dyn RateLimitStore>,
    /// Persona instruction, resolved once at startup.
    pub system_instruction: Arc<str>,
}
