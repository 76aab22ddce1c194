//! # Essight Core
//!
//! Core library for essight.
//! Provides layered configuration, the error taxonomy for configuration and
//! model transport, message types, and the `LlmProvider` abstraction with its
//! Gemini implementation.

pub mod brain;
pub mod config;
pub mod error;
pub mod providers;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, MockReply};
pub use config::{
    AnalysisConfig, DatasetConfig, DatasetSourceConfig, EssightConfig, GatewayConfig, LlmConfig,
    OutlierConfig, OutlierMethod, ResearchDepth, RetryConfig, load_config,
};
pub use error::{ConfigError, LlmError};
pub use providers::{GeminiProvider, create_provider, is_retryable, with_retry};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
