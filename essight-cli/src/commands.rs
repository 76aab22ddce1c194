//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use anyhow::Context;
use essight_analysis::data::DatasetStore;
use essight_analysis::gateway;
use essight_analysis::report::overview_response;
use essight_analysis::research::{GroundingBuilder, ResearchAssistant};
use essight_analysis::stats::{model_summary, overview};
use essight_analysis::{AppState, CachedResult, RegressionAnalysis, ResultsCache};
use essight_core::{DatasetSourceConfig, EssightConfig, ResearchDepth, create_provider};
use std::path::Path;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    data: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Serve { host, port } => {
            let mut config = load(workspace, data)?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            handle_serve(config).await
        }
        Commands::Overview => handle_overview(load(workspace, data)?),
        Commands::Regress {
            method,
            threshold,
            json,
        } => {
            let mut config = load(workspace, data)?;
            if let Some(method) = method {
                config.analysis.outliers.method = method.into();
            }
            if let Some(threshold) = threshold {
                config.analysis.outliers.threshold = threshold;
            }
            config.validate().context("Invalid outlier settings")?;
            handle_regress(config, json)
        }
        Commands::Ask { depth, message } => {
            let depth: ResearchDepth = depth.parse()?;
            handle_ask(load(workspace, data)?, depth, &message).await
        }
    }
}

/// Resolve layered configuration, apply the `--data` override, and validate.
fn load(workspace: &Path, data: Option<&Path>) -> anyhow::Result<EssightConfig> {
    let mut config = essight_core::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(path) = data {
        config.dataset.source = source_for_path(path);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// `.json` files load as JSON records; anything else as comma-separated CSV.
fn source_for_path(path: &Path) -> DatasetSourceConfig {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        DatasetSourceConfig::Json {
            path: path.to_path_buf(),
        }
    } else {
        DatasetSourceConfig::Csv {
            path: path.to_path_buf(),
            delimiter: ',',
        }
    }
}

fn open_store(config: &EssightConfig) -> anyhow::Result<DatasetStore> {
    DatasetStore::load(&config.dataset, &config.analysis.response)
        .with_context(|| format!("Failed to load dataset from {:?}", config.dataset.source))
}

/// A missing API key degrades the assistant rather than failing startup.
fn build_assistant(config: &EssightConfig) -> ResearchAssistant {
    match create_provider(&config.llm) {
        Ok(provider) => ResearchAssistant::new(provider, &config.llm),
        Err(e) => {
            warn!(provider = %config.llm.provider, error = %e, "Research assistant disabled");
            ResearchAssistant::disabled(e.to_string(), &config.llm)
        }
    }
}

async fn handle_serve(config: EssightConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let assistant = build_assistant(&config);
    info!(
        observations = store.snapshot().dataset.len(),
        assistant = assistant.is_configured(),
        "Dataset ready"
    );
    let state = AppState::new(store, assistant, config.analysis.clone());
    gateway::run(state, &config.gateway)
        .await
        .context("HTTP gateway failed")
}

fn handle_overview(config: EssightConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let snapshot = store.snapshot();
    let body = overview_response(&overview(&snapshot.dataset));
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn handle_regress(config: EssightConfig, json: bool) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let snapshot = store.snapshot();
    let analysis = RegressionAnalysis::run(&snapshot.dataset, &config.analysis)
        .context("Regression failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis.to_response())?);
        return Ok(());
    }
    println!("{}", model_summary(&analysis.result));
    println!(
        "Outliers ({}, |score| > {}):",
        analysis.outliers.method, analysis.outliers.threshold
    );
    for (variable, count) in &analysis.outliers.counts {
        println!("  {variable:<16} {count}");
    }
    Ok(())
}

/// Compute the overview and regression locally so the answer is grounded the
/// same way a warmed-up server would ground it.
async fn handle_ask(
    config: EssightConfig,
    depth: ResearchDepth,
    message: &str,
) -> anyhow::Result<()> {
    let assistant = build_assistant(&config);
    let store = open_store(&config)?;
    let snapshot = store.snapshot();
    let cache = ResultsCache::new();

    cache.publish(
        snapshot.generation,
        CachedResult::Overview(overview(&snapshot.dataset)),
    );
    match RegressionAnalysis::run(&snapshot.dataset, &config.analysis) {
        Ok(analysis) => {
            let RegressionAnalysis {
                result,
                outliers,
                correlation,
            } = analysis;
            cache.publish(
                snapshot.generation,
                CachedResult::Regression {
                    result: Box::new(result),
                    outliers,
                },
            );
            cache.publish(snapshot.generation, CachedResult::Correlation(correlation));
        }
        Err(e) => warn!(error = %e, "Answering without regression results"),
    }

    let facts = GroundingBuilder::new(&snapshot, &cache).build();
    let reply = assistant.ask(depth, &facts, message).await?;
    info!(
        model = %reply.model,
        facts = reply.facts_used,
        depth = %reply.research_depth,
        "Assistant answered"
    );
    println!("{}", reply.response);
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".essight");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&EssightConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = essight_core::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
