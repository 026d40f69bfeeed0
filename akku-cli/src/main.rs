//! Akku CLI: runs the ingest, clean, analyze and visualize stages.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Akku: EV registry and CDC nutrition dataset pipeline
#[derive(Parser, Debug)]
#[command(name = "akku", version, about, long_about = None)]
struct Cli {
    /// Workspace directory; relative store and output paths resolve against it
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the workspace akku.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum records stored per dataset
    #[arg(long)]
    sample_size: Option<usize>,

    /// Seed for client-side sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Print the stage report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Download both datasets into the raw collections
    Ingest,
    /// Clean the raw collections and export CSV files
    Clean,
    /// Profile the cleaned collections and write the analysis report
    Analyze,
    /// Render the chart set from the cleaned collections
    Visualize,
    /// Run all four stages in order
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
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
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "akku", "akku")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "akku.log");
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

    let mut config = akku_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?
        .resolve_paths(&workspace);
    if let Some(size) = cli.sample_size {
        config.sample_size = size;
    }
    if cli.seed.is_some() {
        config.sampling_seed = cli.seed;
    }

    let outcome = commands::handle_command(cli.command, &config, cli.json).await;
    if let Err(e) = &outcome {
        match e.downcast_ref::<akku_core::PipelineError>() {
            Some(pe) if pe.is_fatal() => {
                tracing::error!(error = %pe, "Document store unreachable; nothing was run")
            }
            _ => tracing::error!(error = %e, "Stage failed"),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_subcommand_and_flags() {
        let cli = Cli::parse_from(["akku", "-vv", "--seed", "7", "ingest"]);
        assert_eq!(cli.command, Commands::Ingest);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.seed, Some(7));
        assert_eq!(cli.workspace, PathBuf::from("."));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["akku"]).is_err());
    }

    #[test]
    fn test_run_accepts_config_path() {
        let cli = Cli::parse_from(["akku", "--config", "other.toml", "-q", "run"]);
        assert_eq!(cli.command, Commands::Run);
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
        assert!(cli.quiet);
    }
}
