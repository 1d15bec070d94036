pub mod health;

use std::any::Any;

use axum::{
    http::Uri,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::chat::handlers;
use crate::correlation::{assign_correlation_id, current_correlation_id};
use crate::errors::AppError;
use crate::state::AppState;

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

/// Last-resort boundary: a panicking handler still yields a structured 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}"))
        .with_correlation_id(current_correlation_id())
        .into_response()
}

/// The panic boundary sits inside the correlation middleware so a panic's 500 carries the
/// id the request was already logging under.
fn with_request_boundary<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(assign_correlation_id))
}

pub fn build_router(state: AppState) -> Router {
    with_request_boundary(
        Router::new()
            .route("/health", get(health::health_handler))
            .route("/api/chat", post(handlers::handle_chat))
            .fallback(not_found),
    )
    .with_state(state)
}
