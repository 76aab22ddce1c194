//! Integration tests for layered configuration and the provider factory.

use essight_core::{
    CompletionRequest, DatasetSourceConfig, LlmConfig, LlmError, Message, OutlierMethod,
    ResearchDepth, create_provider, load_config, with_retry,
};
use std::sync::atomic::{AtomicU32, Ordering};

fn write_workspace_config(dir: &std::path::Path, toml: &str) {
    let config_dir = dir.join(".essight");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), toml).unwrap();
}

#[test]
fn workspace_config_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write_workspace_config(
        dir.path(),
        r#"
[dataset.source]
type = "json"
path = "data/ess11.json"

[analysis]
predictors = ["lrscale", "agea"]
categorical_predictors = []

[analysis.outliers]
method = "robust_z_score"
threshold = 3.5

[llm]
provider = "mock"

[gateway]
port = 8088
"#,
    );

    let config = load_config(Some(dir.path()), None).unwrap();
    assert_eq!(
        config.dataset.source,
        DatasetSourceConfig::Json {
            path: "data/ess11.json".into()
        }
    );
    assert_eq!(config.analysis.predictors, vec!["lrscale", "agea"]);
    assert!(config.analysis.categorical_predictors.is_empty());
    assert_eq!(config.analysis.outliers.method, OutlierMethod::RobustZScore);
    assert_eq!(config.analysis.outliers.threshold, 3.5);
    // Untouched fields keep their defaults.
    assert_eq!(config.analysis.response, "impcntr");
    assert_eq!(config.llm.provider, "mock");
    assert_eq!(config.llm.api_key_env, "GEMINI_API_KEY");
    assert_eq!(config.gateway.port, 8088);
    assert_eq!(config.gateway.host, "0.0.0.0");
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_retry_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    write_workspace_config(dir.path(), "[llm.retry]\nmax_retries = 3\n");
    let config = load_config(Some(dir.path()), None).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("max_retries"));
}

#[test]
fn unknown_depth_is_rejected() {
    for bad in ["basic", "enhanced", "DEEPER", ""] {
        assert!(bad.parse::<ResearchDepth>().is_err(), "{bad:?} parsed");
    }
    assert_eq!("standard".parse::<ResearchDepth>().unwrap(), ResearchDepth::Standard);
}

#[tokio::test]
async fn mock_provider_from_config() {
    let config = LlmConfig {
        provider: "mock".into(),
        ..Default::default()
    };
    let provider = create_provider(&config).unwrap();
    let response = provider
        .complete(CompletionRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!response.message.content.is_empty());
}

#[test]
fn unknown_provider_is_an_error() {
    let config = LlmConfig {
        provider: "carrier-pigeon".into(),
        ..Default::default()
    };
    assert!(matches!(
        create_provider(&config),
        Err(LlmError::ApiRequest { .. })
    ));
}

#[tokio::test]
async fn retry_gives_up_after_one_retry() {
    let config = essight_core::RetryConfig {
        max_retries: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        backoff_multiplier: 2.0,
    };
    let calls = AtomicU32::new(0);
    let result: Result<(), LlmError> = with_retry(&config, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(LlmError::Connection { message: "refused".into() }) }
    })
    .await;
    assert!(matches!(result, Err(LlmError::Connection { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
