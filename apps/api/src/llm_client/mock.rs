//! Scripted provider for handler tests.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use super::{ChatProvider, LlmError, TextStream, UpstreamRequest};

#[derive(Debug, Clone)]
pub enum MockReply {
    /// Stream these chunks, then end normally.
    Chunks(Vec<String>),
    /// Stream these chunks, then fail mid-stream.
    ChunksThenError(Vec<String>, String),
    /// Refuse the request with a quota error.
    Quota { retry_after_secs: u64 },
    /// Refuse the request with a non-quota API error.
    Api { status: u16, message: String },
}

pub struct MockProvider {
    reply: MockReply,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl MockProvider {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::new(MockReply::Chunks(
            chunks.iter().map(|c| c.to_string()).collect(),
        ))
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn stream_chat(&self, request: UpstreamRequest) -> Result<TextStream, LlmError> {
        self.requests.lock().unwrap().push(request);

        match &self.reply {
            MockReply::Chunks(chunks) => {
                let items: Vec<Result<String, LlmError>> =
                    chunks.iter().cloned().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            MockReply::ChunksThenError(chunks, message) => {
                let mut items: Vec<Result<String, LlmError>> =
                    chunks.iter().cloned().map(Ok).collect();
                items.push(Err(LlmError::Stream(message.clone())));
                Ok(Box::pin(stream::iter(items)))
            }
            MockReply::Quota { retry_after_secs } => Err(LlmError::Quota {
                retry_after_secs: *retry_after_secs,
                message: "Resource has been exhausted".to_string(),
            }),
            MockReply::Api { status, message } => Err(LlmError::Api {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}
