//! Stage 2: turn raw collections into cleaned collections with no missing
//! values, plus a CSV snapshot of each.

use crate::config::PipelineConfig;
use crate::data::schema::{first_present, infer_column_type, looks_numeric};
use crate::data::stats::median;
use crate::data::table::{Table, display_value};
use crate::data::transform::{TransformPipeline, TransformRecord, TransformStep};
use crate::datasets::{
    DatasetDescriptor, DatasetKind, INTERNAL_FIELDS, PROCESSED_AT_FIELD, RECORD_ID_FIELD,
};
use crate::error::PipelineError;
use crate::persistence::atomic_write;
use crate::store::{DocumentStore, Filter, ensure_reachable, replace_collection};
use serde::Serialize;
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Placeholder written into missing non-numeric cells.
pub const UNKNOWN: &str = "Unknown";

/// How many columns the missing-value report lists.
const MISSING_REPORT_LIMIT: usize = 10;

/// Outcome of cleaning one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetCleaning {
    pub dataset: String,
    pub collection: String,
    pub rows: usize,
    pub columns: usize,
    /// Columns with missing values before cleaning, largest first.
    pub missing_before: Vec<(String, usize)>,
    pub coerced_columns: Vec<String>,
    pub remaining_missing: usize,
    pub csv_path: Option<PathBuf>,
    pub steps: Vec<TransformRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub datasets: Vec<DatasetCleaning>,
}

/// Clean every dataset. Only an unreachable store fails the stage; any other
/// failure is logged and recorded against its dataset.
pub fn clean(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<CleaningReport, PipelineError> {
    ensure_reachable(store)?;
    let processed_at = chrono::Utc::now().to_rfc3339();

    let mut datasets = Vec::new();
    for kind in DatasetKind::ALL {
        let descriptor = kind.descriptor();
        let outcome = match clean_dataset(store, descriptor, &config.outputs.csv_dir, &processed_at)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(dataset = descriptor.name, error = %e, "Cleaning failed");
                DatasetCleaning {
                    dataset: descriptor.name.to_string(),
                    collection: descriptor.cleaned_collection.to_string(),
                    rows: 0,
                    columns: 0,
                    missing_before: Vec::new(),
                    coerced_columns: Vec::new(),
                    remaining_missing: 0,
                    csv_path: None,
                    steps: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        datasets.push(outcome);
    }

    for name in store.list_collections()? {
        let documents = store.count(&name, &Filter::All)?;
        info!(collection = %name, documents, "Collection summary");
    }

    Ok(CleaningReport { datasets })
}

/// Read, clean, store and export one dataset.
pub fn clean_dataset(
    store: &dyn DocumentStore,
    descriptor: &DatasetDescriptor,
    csv_dir: &Path,
    processed_at: &str,
) -> Result<DatasetCleaning, PipelineError> {
    let docs = store.find(descriptor.raw_collection, &Filter::data_records())?;
    let mut table = Table::from_documents(docs);
    info!(
        dataset = descriptor.name,
        rows = table.row_count(),
        columns = table.column_count(),
        "Loaded raw records"
    );

    let missing_before = table.missing_summary();
    for (column, missing) in missing_before.iter().take(MISSING_REPORT_LIMIT) {
        let percent = (percent_of(*missing, table.row_count()) * 100.0).round() / 100.0;
        info!(column = %column, missing, percent, "Missing values");
    }

    let (coerced_columns, steps) = clean_table(&mut table, descriptor, processed_at);
    let remaining_missing = table.total_nulls();
    info!(
        dataset = descriptor.name,
        coerced = coerced_columns.len(),
        remaining_missing,
        "Cleaned table"
    );

    let csv_path = descriptor.csv_path(csv_dir);
    let rows = table.row_count();
    let columns = table.column_count();
    let csv = table_to_csv(&table)?;

    let stored = replace_collection(store, descriptor.cleaned_collection, table.into_documents())?;
    info!(
        collection = descriptor.cleaned_collection,
        stored, "Stored cleaned records"
    );

    atomic_write(&csv_path, &csv)?;
    info!(path = %csv_path.display(), "Exported CSV snapshot");

    Ok(DatasetCleaning {
        dataset: descriptor.name.to_string(),
        collection: descriptor.cleaned_collection.to_string(),
        rows,
        columns,
        missing_before,
        coerced_columns,
        remaining_missing,
        csv_path: Some(csv_path),
        steps,
        error: None,
    })
}

/// Apply the cleaning phases to a table in place.
///
/// Returns the columns coerced to numeric and one record per applied step.
pub fn clean_table(
    table: &mut Table,
    descriptor: &DatasetDescriptor,
    processed_at: &str,
) -> (Vec<String>, Vec<TransformRecord>) {
    let mut records = Vec::new();

    let drop = TransformPipeline::new().add_step(TransformStep::DropColumns {
        columns: INTERNAL_FIELDS.iter().map(|f| f.to_string()).collect(),
    });
    records.extend(drop.apply(table));

    // Decide every column from the uncoerced table, then coerce.
    let coerced: Vec<String> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            descriptor.numeric_columns.contains(&name.as_str())
                || (descriptor.infers_types
                    && first_present(table.values(*i)).is_some_and(looks_numeric))
        })
        .map(|(_, name)| name.clone())
        .collect();
    let mut coerce = TransformPipeline::new();
    for column in &coerced {
        debug!(column = %column, "Coercing to numeric");
        coerce.push(TransformStep::CoerceNumeric {
            column: column.clone(),
        });
    }
    records.extend(coerce.apply(table));

    let mut impute = TransformPipeline::new();
    for (i, name) in table.columns.iter().enumerate() {
        if table.null_count(i) == 0 {
            continue;
        }
        let numeric =
            coerced.contains(name) || infer_column_type(table.values(i)).is_numeric();
        let fill = if numeric {
            let values: Vec<f64> = table.values(i).filter_map(Value::as_f64).collect();
            let m = median(&values).unwrap_or(0.0);
            Number::from_f64(m).map(Value::Number).unwrap_or(Value::from(0))
        } else {
            Value::String(UNKNOWN.to_string())
        };
        impute.push(TransformStep::FillNull {
            column: name.clone(),
            value: fill,
        });
    }
    records.extend(impute.apply(table));

    if descriptor.derives_ranges {
        let mut derive = TransformPipeline::new();
        if table.has_column("yearstart") && table.has_column("yearend") {
            derive.push(TransformStep::JoinColumns {
                target: "year_range".into(),
                left: "yearstart".into(),
                right: "yearend".into(),
                separator: "-".into(),
            });
        }
        if table.has_column("low_confidence_limit") && table.has_column("high_confidence_limit") {
            derive.push(TransformStep::Subtract {
                target: "confidence_interval_width".into(),
                minuend: "high_confidence_limit".into(),
                subtrahend: "low_confidence_limit".into(),
            });
        }
        records.extend(derive.apply(table));
    }

    let stamp = TransformPipeline::new()
        .add_step(TransformStep::Constant {
            column: PROCESSED_AT_FIELD.into(),
            value: Value::from(processed_at),
        })
        .add_step(TransformStep::Sequence {
            column: RECORD_ID_FIELD.into(),
            start: 1,
        });
    records.extend(stamp.apply(table));

    (coerced, records)
}

/// Render a table as CSV: a header row, then cells in display form with
/// missing cells left empty.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| match cell {
            Value::Null => String::new(),
            other => display_value(other),
        }))?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

fn percent_of(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
