//! Configuration system for essight.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/essight/config.toml` and/or `.essight/config.toml`
//! in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EssightConfig {
    pub dataset: DatasetConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
    pub gateway: GatewayConfig,
}

impl EssightConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.retry.max_retries > 1 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "llm.retry.max_retries must be 0 or 1, got {}",
                    self.llm.retry.max_retries
                ),
            });
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "llm.request_timeout_secs must be positive".to_string(),
            });
        }
        if !(self.analysis.outliers.threshold > 0.0) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "analysis.outliers.threshold must be positive, got {}",
                    self.analysis.outliers.threshold
                ),
            });
        }
        if self.analysis.predictors.is_empty() && self.analysis.categorical_predictors.is_empty()
        {
            return Err(ConfigError::Invalid {
                message: "analysis.predictors must name at least one variable".to_string(),
            });
        }
        if self.analysis.scatter_sample_size == 0 {
            return Err(ConfigError::Invalid {
                message: "analysis.scatter_sample_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Where the survey snapshot comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetSourceConfig {
    Csv {
        path: PathBuf,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    Json {
        path: PathBuf,
    },
}

fn default_delimiter() -> char {
    ','
}

/// Dataset loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub source: DatasetSourceConfig,
    /// Variables whose absence drops a row during cleaning. The primary
    /// response is always required, whether listed or not.
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            source: DatasetSourceConfig::Csv {
                path: PathBuf::from("ESS11.csv"),
                delimiter: ',',
            },
            required: Vec::new(),
        }
    }
}

/// How per-variable outlier scores are computed after a regression fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Internally studentized residuals for the response, standardized
    /// deviations for numeric predictors.
    #[default]
    StandardizedResidual,
    /// Median/MAD based z-score (Iglewicz & Hoaglin).
    RobustZScore,
}

impl std::fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutlierMethod::StandardizedResidual => write!(f, "standardized_residual"),
            OutlierMethod::RobustZScore => write!(f, "robust_z_score"),
        }
    }
}

/// Outlier detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierConfig {
    pub method: OutlierMethod,
    /// Absolute score above which an observation is flagged.
    pub threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            method: OutlierMethod::StandardizedResidual,
            threshold: 3.0,
        }
    }
}

/// Which model the analysis endpoints fit and summarize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Primary response variable.
    pub response: String,
    /// Numeric predictors, in design-matrix order.
    pub predictors: Vec<String>,
    /// Categorical predictors, treatment-coded after the numeric ones.
    #[serde(default)]
    pub categorical_predictors: Vec<String>,
    /// Variables included in the correlation matrix.
    pub correlation_variables: Vec<String>,
    #[serde(default)]
    pub outliers: OutlierConfig,
    /// Maximum number of points returned by the scatter endpoint.
    pub scatter_sample_size: usize,
    /// Seed for the scatter sample so repeated calls agree.
    pub scatter_seed: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            response: "impcntr".to_string(),
            predictors: vec![
                "lrscale".to_string(),
                "hincfel".to_string(),
                "eisced".to_string(),
                "aesfdrk".to_string(),
                "agea".to_string(),
                "gender_female".to_string(),
            ],
            categorical_predictors: vec!["cntry".to_string()],
            correlation_variables: vec![
                "impcntr".to_string(),
                "lrscale".to_string(),
                "hincfel".to_string(),
                "eisced".to_string(),
                "agea".to_string(),
            ],
            outliers: OutlierConfig::default(),
            scatter_sample_size: 2000,
            scatter_seed: 42,
        }
    }
}

/// Research depth for assistant answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Brief,
    Standard,
    Deep,
}

impl ResearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchDepth::Brief => "brief",
            ResearchDepth::Standard => "standard",
            ResearchDepth::Deep => "deep",
        }
    }
}

impl std::fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchDepth {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(ResearchDepth::Brief),
            "standard" => Ok(ResearchDepth::Standard),
            "deep" => Ok(ResearchDepth::Deep),
            other => Err(ConfigError::Invalid {
                message: format!(
                    "unknown research depth '{other}' (expected brief, standard or deep)"
                ),
            }),
        }
    }
}

/// Retry policy for transient LLM failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Automatic retries after the first attempt. Capped at 1 by validation.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Configuration for the generative-AI client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "gemini" or "mock".
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.0-flash").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key. Prefer `api_key_env`; this exists for tests and overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Per-attempt timeout.
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 2048,
            temperature: 0.4,
            request_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `ESSIGHT_`)
/// 3. Workspace-local config (`.essight/config.toml`)
/// 4. User config (`~/.config/essight/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&EssightConfig>,
) -> Result<EssightConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EssightConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "essight", "essight") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".essight").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // ESSIGHT_GATEWAY__PORT, ESSIGHT_LLM__MODEL, ...
    figment = figment.merge(Env::prefixed("ESSIGHT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })
}
