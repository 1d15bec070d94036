mod chat;
mod config;
mod correlation;
mod errors;
mod llm_client;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::chat::rate_limit::InMemoryRateLimitStore;
use crate::config::Config;
use crate::llm_client::GeminiClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Portfolio API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize upstream client
    let llm = GeminiClient::new(config.google_api_key.clone(), config.gemini_base_url.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let system_instruction = config.load_system_instruction()?;
    info!(
        "System instruction loaded ({} chars, source: {})",
        system_instruction.chars().count(),
        config
            .system_prompt_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );

    let rate_limit = config.rate_limit;
    if rate_limit.enabled {
        info!(
            "Rate limiting enabled: {} requests per {}s",
            rate_limit.max_requests,
            rate_limit.window.as_secs()
        );
    } else {
        info!("Rate limiting disabled");
    }

    // Build app state
    let state = AppState {
        config: config.clone(),
        llm: Arc::new(llm),
        rate_limiter: Arc::new(InMemoryRateLimitStore::new(
            rate_limit.max_requests,
            rate_limit.window,
        )),
        system_instruction: Arc::from(system_instruction),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict to the portfolio origin once it is configurable

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
