//! # Akku Core
//!
//! Stage library for the Akku batch pipeline.
//! Ingests the EV registry and CDC nutrition datasets into a document store,
//! cleans them, computes summary statistics, and renders SVG charts.

pub mod analysis;
pub mod charts;
pub mod clean;
pub mod config;
pub mod data;
pub mod datasets;
pub mod error;
pub mod ingest;
pub mod persistence;
pub mod store;
pub mod visualize;

// Re-export commonly used types at the crate root.
pub use analysis::{AnalysisReport, analyze};
pub use clean::{CleaningReport, clean};
pub use config::{PipelineConfig, load_config};
pub use datasets::{DatasetDescriptor, DatasetKind, EV_DATASET, NUTRITION_DATASET};
pub use error::PipelineError;
pub use ingest::{IngestReport, ingest, ingest_from};
pub use store::{Document, DocumentStore, Filter, MemoryStore, SqliteStore};
pub use visualize::{VisualizationReport, visualize};
