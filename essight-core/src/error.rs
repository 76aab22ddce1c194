//! Error types for the essight core library.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering LLM transport and configuration.

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Provider returned server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// A config file or environment value could not be read into `EssightConfig`.
    #[error("Configuration parse error: {message}")]
    Parse { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = ConfigError::Invalid {
            message: "llm.retry.max_retries must be 0 or 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: llm.retry.max_retries must be 0 or 1"
        );
        let err = ConfigError::Parse {
            message: "invalid type: found string, expected u16".into(),
        };
        assert!(err.to_string().starts_with("Configuration parse error"));
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::Timeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "Request timed out after 1500ms");

        let err = LlmError::Server {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(
            err.to_string(),
            "Provider returned server error 503: overloaded"
        );

        let err = LlmError::ApiRequest {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "API request failed: connection refused");
    }
}
