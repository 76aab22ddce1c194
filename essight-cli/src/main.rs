//! essight CLI: serve the analysis API or run one analysis from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// essight: ESS survey analysis with a grounded research assistant
#[derive(Parser, Debug)]
#[command(name = "essight", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.essight/config.toml`)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Dataset file, overriding the configured source path
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind address, overriding gateway.host
        #[arg(long)]
        host: Option<String>,
        /// Port, overriding gateway.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the data overview as JSON
    Overview,
    /// Fit the configured OLS model and print its summary
    Regress {
        /// Outlier method, overriding analysis.outliers.method
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
        /// Outlier threshold, overriding analysis.outliers.threshold
        #[arg(long)]
        threshold: Option<f64>,
        /// Print the full response as JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },
    /// Ask the research assistant one question
    Ask {
        /// Research depth: brief, standard, or deep
        #[arg(long, default_value = "standard")]
        depth: String,
        /// The question
        message: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration to `.essight/config.toml`
    Init,
    /// Print the resolved configuration
    Show,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum MethodArg {
    StandardizedResidual,
    RobustZScore,
}

impl From<MethodArg> for essight_core::OutlierMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::StandardizedResidual => Self::StandardizedResidual,
            MethodArg::RobustZScore => Self::RobustZScore,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_dir = directories::ProjectDirs::from("dev", "essight", "essight")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "essight.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.data.as_deref()).await
}
