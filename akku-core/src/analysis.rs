//! Stage 3: descriptive statistics over the cleaned collections, two charts
//! and a JSON report.

use crate::charts::{self, Labels, LineSpec};
use crate::config::PipelineConfig;
use crate::data::schema::{ColumnType, infer_schema};
use crate::data::stats::{
    CorrelationMatrix, Describe, GroupStats, correlation_matrix, describe, group_by, n_unique,
    value_counts,
};
use crate::data::table::Table;
use crate::datasets::{DatasetDescriptor, DatasetKind, is_internal_column};
use crate::error::PipelineError;
use crate::persistence::atomic_write_json;
use crate::store::{DocumentStore, Filter, ensure_reachable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

pub const REPORT_FILE: &str = "analysis_report.json";
pub const HEATMAP_FILE: &str = "nutrition_correlation_heatmap.svg";
pub const TREND_FILE: &str = "health_trends_over_time.svg";

/// Nutrition measures summarized and correlated.
pub const KEY_METRICS: [&str; 5] = [
    "data_value",
    "low_confidence_limit",
    "high_confidence_limit",
    "sample_size",
    "confidence_interval_width",
];

const CATEGORICAL_COLUMNS: usize = 5;
const TOP_VALUES_MAX_CARDINALITY: usize = 20;
const TOP_VALUES: usize = 10;
const TOP_LOCATIONS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: ColumnType,
    pub non_null: usize,
    pub nulls: usize,
    pub unique: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub stats: Describe,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueShare {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub unique: usize,
    /// Only reported for low-cardinality columns.
    pub top_values: Option<Vec<ValueShare>>,
}

/// Generic profile of one cleaned dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    pub dataset: String,
    pub collection: String,
    pub records: usize,
    pub columns: usize,
    pub column_info: Vec<ColumnInfo>,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
}

/// Nutrition-specific metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NutritionInsights {
    pub locations: Option<usize>,
    pub top_locations: Vec<(String, usize)>,
    pub years: Vec<f64>,
    pub year_range: Option<(f64, f64)>,
    pub classes: Vec<(String, usize)>,
    pub topics: Option<usize>,
    pub key_metrics: Vec<NumericSummary>,
    pub correlation: Option<CorrelationMatrix>,
    pub yearly: Vec<GroupStats>,
    pub by_class: Vec<GroupStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub datasets: Vec<DatasetProfile>,
    pub nutrition: NutritionInsights,
    pub charts: Vec<PathBuf>,
}

/// Read every document of a cleaned collection into a table.
pub fn load_cleaned(
    store: &dyn DocumentStore,
    descriptor: &DatasetDescriptor,
) -> Result<Table, PipelineError> {
    let docs = store.find(descriptor.cleaned_collection, &Filter::All)?;
    let table = Table::from_documents(docs);
    info!(
        collection = descriptor.cleaned_collection,
        records = table.row_count(),
        "Loaded cleaned records"
    );
    Ok(table)
}

/// Run the analysis stage. Chart failures abort the stage.
pub fn analyze(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<AnalysisReport, PipelineError> {
    ensure_reachable(store)?;
    let out_dir = &config.outputs.analysis_dir;
    std::fs::create_dir_all(out_dir)?;

    let mut datasets = Vec::new();
    let mut nutrition_table = Table::empty();
    for kind in DatasetKind::ALL {
        let descriptor = kind.descriptor();
        let table = load_cleaned(store, descriptor)?;
        let profile = profile_dataset(&table, descriptor);
        info!(
            dataset = descriptor.name,
            records = profile.records,
            columns = profile.columns,
            numeric = profile.numeric.len(),
            categorical = profile.categorical.len(),
            "Profiled dataset"
        );
        datasets.push(profile);
        if kind == DatasetKind::Nutrition {
            nutrition_table = table;
        }
    }

    let nutrition = nutrition_insights(&nutrition_table);
    if let Some(n) = nutrition.locations {
        info!(locations = n, top = ?nutrition.top_locations, "Locations covered");
    }
    if let Some((first, last)) = nutrition.year_range {
        info!(first, last, years = nutrition.years.len(), "Years covered");
    }

    let mut written = Vec::new();
    if let Some(matrix) = &nutrition.correlation {
        let path = out_dir.join(HEATMAP_FILE);
        charts::heatmap(&path, "Nutrition Data - Correlation Matrix", matrix)?;
        info!(path = %path.display(), "Saved chart");
        written.push(path);
    }
    if !nutrition.yearly.is_empty() {
        let path = out_dir.join(TREND_FILE);
        let points: Vec<(f64, f64)> = nutrition
            .yearly
            .iter()
            .filter_map(|g| Some((g.key_value?, g.mean?)))
            .collect();
        charts::line_chart(
            &path,
            Labels {
                title: "Health Indicators Trend Over Time",
                x: "Year",
                y: "Average Data Value",
            },
            &[LineSpec {
                label: "Mean".into(),
                points,
                color: charts::STEEL_BLUE,
            }],
            None,
        )?;
        info!(path = %path.display(), "Saved chart");
        written.push(path);
    }

    let report = AnalysisReport {
        generated_at: Utc::now(),
        datasets,
        nutrition,
        charts: written,
    };
    let report_path = out_dir.join(REPORT_FILE);
    atomic_write_json(&report_path, &report)?;
    info!(path = %report_path.display(), "Wrote analysis report");
    Ok(report)
}

/// Overview, per-column info, numeric `describe`, and categorical summaries.
pub fn profile_dataset(table: &Table, descriptor: &DatasetDescriptor) -> DatasetProfile {
    let rows = table.row_count();
    let mut column_info = Vec::with_capacity(table.column_count());
    let mut numeric = Vec::new();
    let mut categorical = Vec::new();

    let schema = infer_schema(table);
    for (i, column) in schema.columns.iter().enumerate() {
        let (name, dtype) = (&column.name, column.dtype);
        let nulls = table.null_count(i);
        column_info.push(ColumnInfo {
            name: name.clone(),
            dtype,
            non_null: rows - nulls,
            nulls,
            unique: n_unique(table.values(i)),
        });

        if is_internal_column(name) {
            continue;
        }
        if dtype.is_numeric() {
            numeric.push(NumericSummary {
                column: name.clone(),
                stats: describe(&table.numeric_values(name)),
            });
        } else if matches!(dtype, ColumnType::String | ColumnType::Mixed)
            && categorical.len() < CATEGORICAL_COLUMNS
        {
            categorical.push(categorical_summary(table, i, name));
        }
    }

    DatasetProfile {
        dataset: descriptor.name.to_string(),
        collection: descriptor.cleaned_collection.to_string(),
        records: rows,
        columns: table.column_count(),
        column_info,
        numeric,
        categorical,
    }
}

fn categorical_summary(table: &Table, idx: usize, name: &str) -> CategoricalSummary {
    let counts = value_counts(table.values(idx));
    let unique = counts.len();
    let rows = table.row_count().max(1) as f64;
    let top_values = (unique <= TOP_VALUES_MAX_CARDINALITY).then(|| {
        counts
            .into_iter()
            .take(TOP_VALUES)
            .map(|(value, count)| ValueShare {
                value,
                count,
                percent: count as f64 / rows * 100.0,
            })
            .collect()
    });
    CategoricalSummary {
        column: name.to_string(),
        unique,
        top_values,
    }
}

/// Locations, years, classes, key metric summaries, correlations and grouped
/// `data_value` aggregates. Anything whose columns are absent stays empty.
pub fn nutrition_insights(table: &Table) -> NutritionInsights {
    let mut insights = NutritionInsights::default();

    if let Some(locations) = table.column("locationdesc") {
        let counts = value_counts(locations);
        insights.locations = Some(counts.len());
        insights.top_locations = counts.into_iter().take(TOP_LOCATIONS).collect();
    }

    if table.has_column("yearstart") {
        let mut years = table.numeric_values("yearstart");
        years.sort_by(f64::total_cmp);
        years.dedup();
        insights.year_range = years.first().copied().zip(years.last().copied());
        insights.years = years;
    }

    if let Some(classes) = table.column("class") {
        insights.classes = value_counts(classes);
    }
    if let Some(topics) = table.column("topic") {
        insights.topics = Some(n_unique(topics));
    }

    let present: Vec<&str> = KEY_METRICS
        .iter()
        .copied()
        .filter(|c| table.has_column(c))
        .collect();
    insights.key_metrics = present
        .iter()
        .map(|c| NumericSummary {
            column: c.to_string(),
            stats: describe(&table.numeric_values(c)),
        })
        .collect();

    if present.len() >= 2 {
        let columns: Vec<(String, Vec<Option<f64>>)> = present
            .iter()
            .filter_map(|c| {
                let cells = table.column(c)?;
                Some((c.to_string(), cells.into_iter().map(Value::as_f64).collect()))
            })
            .collect();
        insights.correlation = Some(correlation_matrix(&columns));
    }

    if let Some(values) = table.column("data_value") {
        if let Some(years) = table.column("yearstart") {
            insights.yearly = group_by(years, values.iter().copied());
        }
        if let Some(classes) = table.column("class") {
            insights.by_class = group_by(classes, values.iter().copied());
        }
    }

    insights
}
