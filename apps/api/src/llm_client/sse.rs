use std::fmt::Display;

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::{LlmError, TextStream};

/// Incremental decoder for a `text/event-stream` body.
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns the `data` payload of every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(payload) = event_data(&event[..pos]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();

    let joined = data.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Finish reasons for a reply the model ended on its own terms.
const NORMAL_FINISH_REASONS: [&str; 2] = ["STOP", "MAX_TOKENS"];

/// What one `GenerateContentResponse` payload contributes to the reply.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StreamEvent {
    pub text: Option<String>,
    /// The upstream marked the reply as complete.
    pub finished: bool,
}

/// Decodes one payload. Blocked prompts, error objects and any finish reason other than
/// a normal stop are stream errors, so the relay reports them in-band.
pub fn parse_event(payload: &str) -> Result<StreamEvent, LlmError> {
    let json: Value = serde_json::from_str(payload)
        .map_err(|e| LlmError::Stream(format!("undecodable upstream event: {e}")))?;

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown upstream error");
        return Err(LlmError::Stream(message.to_string()));
    }

    if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
        return Err(LlmError::Stream(format!("prompt blocked upstream: {reason}")));
    }

    let candidate = json["candidates"]
        .as_array()
        .and_then(|candidates| candidates.first());

    let finish_reason = candidate.and_then(|c| c["finishReason"].as_str());
    if let Some(reason) = finish_reason {
        if !NORMAL_FINISH_REASONS.contains(&reason) {
            return Err(LlmError::Stream(format!("reply ended abnormally: {reason}")));
        }
    }

    let text: String = candidate
        .and_then(|c| c["content"]["parts"].as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(StreamEvent {
        text: (!text.is_empty()).then_some(text),
        finished: finish_reason.is_some(),
    })
}

/// Turns an upstream byte stream into a stream of text increments.
/// Ends after yielding the first error. A body that closes before any event carried a
/// finish reason is treated as truncated.
pub fn text_stream<S, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream! {
        let mut decoder = SseDecoder::default();
        let mut bytes = Box::pin(bytes);
        let mut finished = false;

        loop {
            let payloads = match bytes.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => {
                    yield Err(LlmError::Stream(format!("upstream connection failed: {e}")));
                    return;
                }
                None => break,
            };

            for payload in payloads {
                match parse_event(&payload) {
                    Ok(event) => {
                        finished |= event.finished;
                        if let Some(text) = event.text {
                            yield Ok(text);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            match parse_event(&payload) {
                Ok(event) => {
                    finished |= event.finished;
                    if let Some(text) = event.text {
                        yield Ok(text);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if !finished {
            yield Err(LlmError::Stream(
                "upstream closed the stream before finishing the reply".to_string(),
            ));
        }
    })
}
