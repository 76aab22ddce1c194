//! LLM provider implementations.
//!
//! Provides the Google Gemini implementation of the `LlmProvider` trait and a
//! retry helper shared by callers that talk to a remote model.
//!
//! Use `create_provider()` to instantiate the provider named in config.

pub mod gemini;

use crate::brain::{LlmProvider, MockLlmProvider};
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use crate::config::RetryConfig;
pub use gemini::GeminiProvider;

/// Execute an async operation, retrying transient failures with exponential backoff.
///
/// Only `LlmError::Timeout`, `LlmError::Connection` and `LlmError::Server` are
/// retried. Everything else (auth, parse, rate limit, 4xx) returns immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Check if an error is transient.
pub fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::Timeout { .. } | LlmError::Connection { .. } | LlmError::Server { .. }
    )
}

/// Exponential backoff, capped at `max_backoff_ms`.
fn compute_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    base.min(config.max_backoff_ms as f64) as u64
}

/// Resolve the API key for a provider: an explicit key in config wins, then the
/// environment variable named by `api_key_env`.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    if let Some(key) = config.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        return Ok(key.clone());
    }
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(LlmError::AuthFailed {
            provider: format!("{} (env var '{}' not set)", config.provider, config.api_key_env),
        }),
    }
}

/// Create an LLM provider based on the configuration.
///
/// `"mock"` yields an offline `MockLlmProvider`. Returns `LlmError::AuthFailed`
/// when no API key can be resolved, and `LlmError::ApiRequest` for an unknown
/// provider name.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "mock" => Ok(Arc::new(MockLlmProvider::new())),
        other => Err(LlmError::ApiRequest {
            message: format!("unsupported LLM provider '{other}'"),
        }),
    }
}
