//! Per-request correlation id.
//!
//! The id is minted once at the edge of the router, stored in the request extensions for
//! handlers, and kept in a task-local while the request is served so the panic boundary and
//! the fallback can attach the same id to their error bodies.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::chat::models::{CorrelationId, CORRELATION_ID_HEADER};

tokio::task_local! {
    static CURRENT: CorrelationId;
}

pub async fn assign_correlation_id(mut req: Request, next: Next) -> Response {
    let correlation_id = CorrelationId::new();
    req.extensions_mut().insert(correlation_id);

    let mut response = CURRENT.scope(correlation_id, next.run(req)).await;

    if !response.headers().contains_key(CORRELATION_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
    }
    response
}

/// The id of the request being served, or a fresh one when called outside a request.
pub fn current_correlation_id() -> CorrelationId {
    CURRENT.try_with(|id| *id).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_id_is_scoped_to_the_request() {
        let id = CorrelationId::new();
        let seen = CURRENT.scope(id, async { current_correlation_id() }).await;
        assert_eq!(seen, id);

        assert_ne!(current_correlation_id(), id);
    }
}
