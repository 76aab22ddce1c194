//! Brain module: LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions, and a
//! scriptable `MockLlmProvider` for tests and offline runs.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// One scripted outcome for the mock provider.
#[derive(Debug)]
pub enum MockReply {
    Text(String),
    Error(LlmError),
}

/// A mock LLM provider for testing.
///
/// Replies are consumed in order; once the queue is empty the default text is
/// returned. An optional delay is applied before every reply, which lets tests
/// drive the timeout path.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<MockReply>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        provider.queue(MockReply::Text(text.to_string()));
        provider
    }

    /// Delay every reply by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a reply to be returned by the next `complete` call.
    pub fn queue(&self, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Number of `complete` calls that started.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, for asserting on prompt contents.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    /// Create a simple text response.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().ok().and_then(|mut r| {
            // The final text reply is sticky so repeated calls keep answering.
            if r.len() == 1 {
                if let Some(MockReply::Text(t)) = r.front() {
                    return Some(MockReply::Text(t.clone()));
                }
            }
            r.pop_front()
        });
        match next {
            Some(MockReply::Text(text)) => Ok(Self::text_response(&text)),
            Some(MockReply::Error(err)) => Err(err),
            None => Ok(Self::text_response(
                "I'm a mock LLM. No queued responses available.",
            )),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
