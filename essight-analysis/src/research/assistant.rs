//! Research assistant: composes a depth-scoped prompt and sends it to the
//! configured LLM provider under a bounded timeout and retry policy.

use crate::error::{AssistantError, AssistantUnavailableError};
use crate::research::composer::{ComposedPrompt, compose};
use essight_core::{
    CompletionRequest, LlmConfig, LlmError, LlmProvider, Message, ResearchDepth, RetryConfig,
    TokenUsage, with_retry,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One answered chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub response: String,
    pub research_depth: ResearchDepth,
    pub model: String,
    pub usage: TokenUsage,
    pub facts_used: usize,
}

pub struct ResearchAssistant {
    provider: Option<Arc<dyn LlmProvider>>,
    /// Why `provider` is absent, reported with `NotConfigured`.
    unavailable_reason: String,
    timeout: Duration,
    retry: RetryConfig,
    max_tokens: usize,
    temperature: f32,
}

impl std::fmt::Debug for ResearchAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchAssistant")
            .field(
                "provider",
                &self.provider.as_ref().map(|p| p.model_name().to_string()),
            )
            .field("timeout", &self.timeout)
            .field("max_retries", &self.retry.max_retries)
            .finish()
    }
}

impl ResearchAssistant {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider: Some(provider),
            ..Self::disabled("", config)
        }
    }

    /// An assistant that answers every request with `NotConfigured`.
    pub fn disabled(reason: impl Into<String>, config: &LlmConfig) -> Self {
        Self {
            provider: None,
            unavailable_reason: reason.into(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            retry: config.retry.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Compose a prompt for `depth` from `grounding` and ask the provider.
    pub async fn ask(
        &self,
        depth: ResearchDepth,
        grounding: &[String],
        message: &str,
    ) -> Result<AssistantReply, AssistantError> {
        if message.trim().is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        let Some(provider) = self.provider.as_ref() else {
            return Err(AssistantError::NotConfigured(self.unavailable_reason.clone()));
        };

        let prompt = compose(depth, grounding, message);
        let request = self.request_for(&prompt);
        let attempts = AtomicU32::new(0);
        let timeout = self.timeout;

        debug!(
            %depth,
            facts = prompt.context.grounding_facts.len(),
            model = provider.model_name(),
            "Asking research assistant"
        );

        let outcome = with_retry(&self.retry, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let request = request.clone();
            async move {
                match tokio::time::timeout(timeout, provider.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            }
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(response) => {
                info!(
                    %depth,
                    attempts,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Research assistant answered"
                );
                Ok(AssistantReply {
                    response: response.message.content,
                    research_depth: depth,
                    model: response.model,
                    usage: response.usage,
                    facts_used: prompt.context.grounding_facts.len(),
                })
            }
            Err(source) => {
                warn!(%depth, attempts, error = %source, "Research assistant unavailable");
                Err(AssistantUnavailableError { attempts, source }.into())
            }
        }
    }

    fn request_for(&self, prompt: &ComposedPrompt) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                Message::system(prompt.system_prompt.clone()),
                Message::user(prompt.user_prompt.clone()),
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            model: None,
        }
    }
}
