//! CLI subcommand handlers.

use crate::Commands;
use akku_core::{DocumentStore, PipelineConfig, SqliteStore};
use anyhow::Context;
use serde_json::Value;
use tracing::info;

/// Open the configured store and run the requested stage(s).
pub async fn handle_command(
    command: Commands,
    config: &PipelineConfig,
    json: bool,
) -> anyhow::Result<()> {
    let store = SqliteStore::open(&config.store.path, &config.store.database).with_context(|| {
        format!(
            "Failed to open document store at {}",
            config.store.path.display()
        )
    })?;
    info!(
        path = %config.store.path.display(),
        database = store.database(),
        "Opened document store"
    );

    match command {
        Commands::Ingest => handle_ingest(&store, config, json).await,
        Commands::Clean => handle_clean(&store, config, json),
        Commands::Analyze => handle_analyze(&store, config, json),
        Commands::Visualize => handle_visualize(&store, config, json),
        Commands::Run => {
            handle_ingest(&store, config, json).await?;
            handle_clean(&store, config, json)?;
            handle_analyze(&store, config, json)?;
            handle_visualize(&store, config, json)
        }
    }
}

fn emit(json: bool, report: Value) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

async fn handle_ingest(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    json: bool,
) -> anyhow::Result<()> {
    let report = akku_core::ingest(store, config).await?;
    if !json {
        println!("Ingestion");
        for d in &report.datasets {
            match &d.error {
                None => println!(
                    "  {:<40} {} of {} records -> {}",
                    d.dataset, d.stored, d.total_available, d.collection
                ),
                Some(e) => println!("  {:<40} skipped: {}", d.dataset, e),
            }
        }
    }
    emit(json, serde_json::to_value(&report)?)
}

fn handle_clean(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    json: bool,
) -> anyhow::Result<()> {
    let report = akku_core::clean(store, config)?;
    if !json {
        println!("Cleaning");
        for d in &report.datasets {
            match (&d.error, &d.csv_path) {
                (Some(e), _) => println!("  {:<40} failed: {}", d.dataset, e),
                (None, Some(csv)) => println!(
                    "  {:<40} {} rows x {} columns -> {}",
                    d.dataset,
                    d.rows,
                    d.columns,
                    csv.display()
                ),
                (None, None) => println!("  {:<40} {} rows", d.dataset, d.rows),
            }
        }
    }
    emit(json, serde_json::to_value(&report)?)
}

fn handle_analyze(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    json: bool,
) -> anyhow::Result<()> {
    let report = akku_core::analyze(store, config)?;
    if !json {
        println!("Analysis");
        for p in &report.datasets {
            println!("  {:<40} {} records", p.dataset, p.records);
        }
        println!(
            "  Report: {}",
            config
                .outputs
                .analysis_dir
                .join(akku_core::analysis::REPORT_FILE)
                .display()
        );
    }
    emit(json, serde_json::to_value(&report)?)
}

fn handle_visualize(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    json: bool,
) -> anyhow::Result<()> {
    let report = akku_core::visualize(store, config)?;
    if !json {
        println!("Charts in {}", config.outputs.visualization_dir.display());
        for (i, file) in report.directory_listing.iter().enumerate() {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("  {:>2}. {}", i + 1, name);
        }
    }
    emit(json, serde_json::to_value(&report)?)
}
