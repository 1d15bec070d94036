//! Forwards upstream text increments to the client as a chunked body.
//!
//! Headers are already committed once relaying starts, so a mid-stream failure is reported
//! in-band: a marker is appended and the body is closed normally.

use std::convert::Infallible;

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{info, warn, Span};

use crate::llm_client::{LlmError, TextStream};

/// Appended to the body when the upstream fails after streaming has begun.
pub const STREAM_ERROR_MARKER: &str =
    "\n\n[Error: The response was interrupted. Please try again.]";

/// Tracks how a relay ended so every stream produces exactly one outcome log line.
/// Dropping it before completion means the client went away and the upstream was abandoned.
struct RelayOutcome {
    span: Span,
    chunks: usize,
    finished: bool,
}

impl RelayOutcome {
    fn new(span: Span) -> Self {
        Self {
            span,
            chunks: 0,
            finished: false,
        }
    }

    fn completed(&mut self) {
        self.finished = true;
        let chunks = self.chunks;
        self.span
            .in_scope(|| info!(outcome = "completed", chunks, "Chat stream completed"));
    }

    fn interrupted(&mut self, err: &LlmError) {
        self.finished = true;
        let chunks = self.chunks;
        self.span.in_scope(|| {
            warn!(
                outcome = "interrupted",
                chunks,
                "Chat stream interrupted: {err}"
            )
        });
    }
}

impl Drop for RelayOutcome {
    fn drop(&mut self) {
        if !self.finished {
            let chunks = self.chunks;
            self.span.in_scope(|| {
                info!(
                    outcome = "cancelled",
                    chunks, "Client disconnected, upstream stream abandoned"
                )
            });
        }
    }
}

/// Relays `upstream` verbatim and in order. Logs are emitted inside `span`.
pub fn relay(
    mut upstream: TextStream,
    span: Span,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream! {
        let mut outcome = RelayOutcome::new(span);

        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    outcome.chunks += 1;
                    yield Ok(Bytes::from(text));
                }
                Err(err) => {
                    outcome.interrupted(&err);
                    yield Ok(Bytes::from_static(STREAM_ERROR_MARKER.as_bytes()));
                    return;
                }
            }
        }

        outcome.completed();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use super::*;
    use futures::stream;
    use tracing_test::traced_test;

    fn upstream(items: Vec<Result<String, LlmError>>) -> TextStream {
        Box::pin(stream::iter(items))
    }

    async fn collect(upstream: TextStream) -> Vec<Bytes> {
        relay(upstream, Span::none())
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_forwards_chunks_in_order() {
        let out = collect(upstream(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
        ]))
        .await;
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_skips_empty_chunks() {
        let out = collect(upstream(vec![Ok(String::new()), Ok("x".to_string())])).await;
        assert_eq!(out, vec!["x"]);
    }

    #[tokio::test]
    async fn test_error_appends_single_marker_and_ends() {
        let out = collect(upstream(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
            Err(LlmError::Stream("reset".to_string())),
            Ok("after".to_string()),
        ]))
        .await;
        assert_eq!(out, vec!["one", "two", STREAM_ERROR_MARKER]);
    }

    /// Upstream that counts polls and records when it is dropped.
    struct TrackedUpstream {
        items: VecDeque<Result<String, LlmError>>,
        polls: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    impl Stream for TrackedUpstream {
        type Item = Result<String, LlmError>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(self.items.pop_front())
        }
    }

    impl Drop for TrackedUpstream {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_dropping_relay_drops_upstream_and_logs_cancelled() {
        let polls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let upstream = TrackedUpstream {
            items: VecDeque::from(vec![Ok("first".to_string()), Ok("second".to_string())]),
            polls: polls.clone(),
            dropped: dropped.clone(),
        };

        let mut relayed = Box::pin(relay(Box::pin(upstream), Span::none()));
        let first = relayed.next().await.unwrap().unwrap();
        assert_eq!(first, "first");
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert!(!dropped.load(Ordering::SeqCst));

        drop(relayed);

        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert!(logs_contain("outcome=\"cancelled\""));
        assert!(logs_contain("chunks=1"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_finished_relay_logs_completed_only() {
        collect(upstream(vec![Ok("done".to_string())])).await;

        assert!(logs_contain("outcome=\"completed\""));
        assert!(!logs_contain("cancelled"));
    }
}
