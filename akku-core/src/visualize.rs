//! Stage 4: the fixed chart set over the cleaned collections.

use crate::analysis::load_cleaned;
use crate::charts::{self, Band, CORAL, Labels, LineSpec, SEA_GREEN, STEEL_BLUE};
use crate::config::PipelineConfig;
use crate::data::schema::{ColumnType, infer_schema};
use crate::data::stats::{group_by, histogram, n_unique, value_counts};
use crate::data::table::{Table, display_value};
use crate::datasets::{EV_DATASET, NUTRITION_DATASET, is_internal_column};
use crate::error::PipelineError;
use crate::persistence::{file_stem_for, list_files_with_extension};
use crate::store::{DocumentStore, ensure_reachable};
use plotters::style::{Palette, Palette99, RGBColor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const EV_TOP_VALUES: usize = 15;
const EV_CARDINALITY: std::ops::RangeInclusive<usize> = 5..=50;
const TOP_STATES: usize = 20;
const TOP_CLASSES: usize = 5;
const HISTOGRAM_BINS: usize = 50;

/// Charts written by one visualization run, plus every SVG now in the
/// output directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VisualizationReport {
    pub written: Vec<PathBuf>,
    pub directory_listing: Vec<PathBuf>,
}

/// Render every chart whose columns are present. The first chart failure
/// aborts the remaining charts.
pub fn visualize(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<VisualizationReport, PipelineError> {
    ensure_reachable(store)?;
    let out = config.outputs.visualization_dir.as_path();
    std::fs::create_dir_all(out)?;

    let ev = load_cleaned(store, &EV_DATASET)?;
    let nutrition = load_cleaned(store, &NUTRITION_DATASET)?;

    let mut written = Vec::new();
    let mut record = |path: Option<PathBuf>| {
        if let Some(p) = path {
            info!(path = %p.display(), "Saved chart");
            written.push(p);
        }
    };

    record(ev_distribution(&ev, out)?);
    record(health_by_state(&nutrition, out)?);
    for path in health_categories(&nutrition, out)? {
        record(Some(path));
    }
    record(trends_time_series(&nutrition, out)?);
    record(trends_by_category(&nutrition, out)?);
    record(value_distributions(&nutrition, out)?);
    record(sample_size_vs_value(&nutrition, out)?);

    let directory_listing = list_files_with_extension(out, "svg")?;
    info!(
        written = written.len(),
        total = directory_listing.len(),
        dir = %out.display(),
        "Visualization summary"
    );
    for (i, file) in directory_listing.iter().enumerate() {
        info!(n = i + 1, file = %file.display(), "Chart file");
    }

    Ok(VisualizationReport {
        written,
        directory_listing,
    })
}

fn count_label(v: f64) -> String {
    format!("{v:.0}")
}

fn one_decimal(v: f64) -> String {
    format!("{v:.1}")
}

/// First non-internal text column with a cardinality in the EV range.
pub fn ev_distribution_column(table: &Table) -> Option<&str> {
    let schema = infer_schema(table);
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_internal_column(name))
        .filter(|(_, name)| {
            matches!(
                schema.dtype_of(name),
                Some(ColumnType::String | ColumnType::Mixed)
            )
        })
        .find(|(i, _)| EV_CARDINALITY.contains(&n_unique(table.values(*i))))
        .map(|(_, name)| name.as_str())
}

fn ev_distribution(table: &Table, out: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let Some(column) = ev_distribution_column(table) else {
        warn!("No EV column with 5 to 50 distinct values; skipping distribution chart");
        return Ok(None);
    };
    let counts: Vec<(String, f64)> = table
        .column(column)
        .map(value_counts)
        .unwrap_or_default()
        .into_iter()
        .take(EV_TOP_VALUES)
        .map(|(value, count)| (value, count as f64))
        .collect();

    let path = out.join(format!("ev_distribution_{}.svg", file_stem_for(column)));
    let title = format!("Electric Vehicle Distribution by {column}");
    charts::horizontal_bars(
        &path,
        Labels {
            title: &title,
            x: "Count",
            y: column,
        },
        &counts,
        STEEL_BLUE,
        count_label,
    )?;
    Ok(Some(path))
}

/// Mean `data_value` per location, highest first.
pub fn mean_by_location(table: &Table) -> Vec<(String, f64)> {
    let (Some(locations), Some(values)) = (table.column("locationdesc"), table.column("data_value"))
    else {
        return Vec::new();
    };
    let mut means: Vec<(String, f64)> = group_by(locations, values)
        .into_iter()
        .filter_map(|g| Some((g.key, g.mean?)))
        .collect();
    means.sort_by(|a, b| b.1.total_cmp(&a.1));
    means
}

fn health_by_state(table: &Table, out: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let mut means = mean_by_location(table);
    if means.is_empty() {
        return Ok(None);
    }
    means.truncate(TOP_STATES);
    let path = out.join("health_by_state.svg");
    charts::horizontal_bars(
        &path,
        Labels {
            title: "Average Health Indicators by State (Top 20)",
            x: "Average Data Value",
            y: "State",
        },
        &means,
        CORAL,
        one_decimal,
    )?;
    Ok(Some(path))
}

fn class_counts(table: &Table) -> Option<Vec<(String, usize)>> {
    table.column("class").map(value_counts)
}

fn health_categories(table: &Table, out: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let counts = class_counts(table).unwrap_or_default();
    if counts.is_empty() {
        return Ok(Vec::new());
    }
    let slices: Vec<(String, f64)> = counts
        .into_iter()
        .map(|(name, count)| (name, count as f64))
        .collect();

    let pie_path = out.join("health_categories_pie.svg");
    charts::pie(&pie_path, "Distribution of Health Categories", &slices)?;

    let bar_path = out.join("health_categories_bar.svg");
    charts::vertical_bars(
        &bar_path,
        Labels {
            title: "Health Categories - Record Count",
            x: "Health Category",
            y: "Number of Records",
        },
        &slices,
        SEA_GREEN,
        count_label,
    )?;
    Ok(vec![pie_path, bar_path])
}

fn trends_time_series(table: &Table, out: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let (Some(years), Some(values)) = (table.column("yearstart"), table.column("data_value"))
    else {
        return Ok(None);
    };
    let yearly = group_by(years, values);

    let mut mean = Vec::new();
    let mut median = Vec::new();
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    for g in &yearly {
        let Some(x) = g.key_value else { continue };
        if let Some(m) = g.mean {
            mean.push((x, m));
            // A single-value year has no spread; the band collapses onto the mean.
            let sd = g.std.unwrap_or(0.0);
            lower.push((x, m - sd));
            upper.push((x, m + sd));
        }
        if let Some(md) = g.median {
            median.push((x, md));
        }
    }
    if mean.is_empty() {
        return Ok(None);
    }

    let path = out.join("health_trends_time_series.svg");
    charts::line_chart(
        &path,
        Labels {
            title: "Health Indicators Trends Over Time",
            x: "Year",
            y: "Health Indicator Value",
        },
        &[
            LineSpec {
                label: "Mean".into(),
                points: mean,
                color: STEEL_BLUE,
            },
            LineSpec {
                label: "Median".into(),
                points: median,
                color: CORAL,
            },
        ],
        Some(&Band {
            label: "±1 Std Dev".into(),
            lower,
            upper,
            color: STEEL_BLUE,
        }),
    )?;
    Ok(Some(path))
}

/// The most frequent classes, most frequent first.
fn top_classes(table: &Table) -> Vec<String> {
    class_counts(table)
        .unwrap_or_default()
        .into_iter()
        .take(TOP_CLASSES)
        .map(|(name, _)| name)
        .collect()
}

/// Yearly mean `data_value` for each of the most frequent classes.
pub fn yearly_means_by_class(table: &Table) -> Vec<(String, Vec<(f64, f64)>)> {
    let (Some(years), Some(classes), Some(values)) = (
        table.column("yearstart"),
        table.column("class"),
        table.column("data_value"),
    ) else {
        return Vec::new();
    };

    top_classes(table)
        .into_iter()
        .map(|class| {
            let (keys, vals): (Vec<_>, Vec<_>) = years
                .iter()
                .zip(&values)
                .zip(&classes)
                .filter(|(_, c)| display_value(c) == class)
                .map(|((y, v), _)| (*y, *v))
                .unzip();
            let points = group_by(keys, vals)
                .into_iter()
                .filter_map(|g| Some((g.key_value?, g.mean?)))
                .collect();
            (class, points)
        })
        .collect()
}

fn trends_by_category(table: &Table, out: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let series = yearly_means_by_class(table);
    if series.iter().all(|(_, points)| points.is_empty()) {
        return Ok(None);
    }
    let lines: Vec<LineSpec> = series
        .into_iter()
        .enumerate()
        .map(|(i, (label, points))| {
            let c = Palette99::COLORS[i % Palette99::COLORS.len()];
            LineSpec {
                label,
                points,
                color: RGBColor(c.0, c.1, c.2),
            }
        })
        .collect();

    let path = out.join("health_trends_by_category.svg");
    charts::line_chart(
        &path,
        Labels {
            title: "Health Trends by Category Over Time",
            x: "Year",
            y: "Average Value",
        },
        &lines,
        None,
    )?;
    Ok(Some(path))
}

fn value_distributions(table: &Table, out: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let values = table.numeric_values("data_value");
    if values.is_empty() {
        return Ok(None);
    }
    let bins = histogram(&values, HISTOGRAM_BINS);

    let mut by_class: HashMap<String, Vec<f64>> = HashMap::new();
    if let (Some(classes), Some(cells)) = (table.column("class"), table.column("data_value")) {
        for (c, v) in classes.iter().zip(&cells) {
            if let Some(x) = v.as_f64() {
                by_class.entry(display_value(c)).or_default().push(x);
            }
        }
    }
    let groups: Vec<(String, Vec<f64>)> = top_classes(table)
        .into_iter()
        .map(|name| {
            let vals = by_class.remove(&name).unwrap_or_default();
            (name, vals)
        })
        .collect();

    let path = out.join("data_value_distributions.svg");
    charts::histogram_and_boxplot(
        &path,
        Labels {
            title: "Distribution of Health Indicator Values",
            x: "Data Value",
            y: "Frequency",
        },
        &values,
        &bins,
        Labels {
            title: "Value Distribution by Category",
            x: "Health Category",
            y: "Data Value",
        },
        &groups,
    )?;
    Ok(Some(path))
}

fn sample_size_vs_value(table: &Table, out: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let (Some(sizes), Some(values)) = (table.column("sample_size"), table.column("data_value"))
    else {
        return Ok(None);
    };
    let points: Vec<(f64, f64)> = sizes
        .iter()
        .zip(&values)
        .filter_map(|(s, v)| Some((s.as_f64()?, v.as_f64()?)))
        .collect();
    if points.is_empty() {
        return Ok(None);
    }

    let path = out.join("sample_size_vs_value.svg");
    charts::scatter(
        &path,
        Labels {
            title: "Relationship between Sample Size and Data Value",
            x: "Sample Size",
            y: "Data Value",
        },
        &points,
        SEA_GREEN,
    )?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev_table(distinct: usize) -> Table {
        Table {
            columns: vec!["_record_id".into(), "VIN".into(), "Make".into()],
            rows: (0..60)
                .map(|i| {
                    vec![
                        json!(i + 1),
                        json!(format!("VIN{i}")),
                        json!(format!("MAKE{}", i % distinct)),
                    ]
                })
                .collect(),
        }
    }

    fn nutrition_table() -> Table {
        let rows = [
            (2019, "Ohio", "Obesity", 30.0, 100),
            (2019, "Iowa", "Obesity", 34.0, 200),
            (2020, "Ohio", "Obesity", 32.0, 150),
            (2020, "Iowa", "Activity", 20.0, 120),
            (2021, "Utah", "Activity", 22.0, 90),
        ];
        Table {
            columns: vec![
                "yearstart".into(),
                "locationdesc".into(),
                "class".into(),
                "data_value".into(),
                "sample_size".into(),
            ],
            rows: rows
                .iter()
                .map(|(y, l, c, v, s)| vec![json!(y), json!(l), json!(c), json!(v), json!(s)])
                .collect(),
        }
    }

    #[test]
    fn test_ev_distribution_column_respects_cardinality() {
        // VIN has 60 distinct values, so Make is chosen.
        assert_eq!(ev_distribution_column(&ev_table(7)), Some("Make"));
        assert_eq!(ev_distribution_column(&ev_table(3)), None);
    }

    #[test]
    fn test_mean_by_location_sorted_desc() {
        let means = mean_by_location(&nutrition_table());
        assert_eq!(
            means,
            vec![
                ("Ohio".to_string(), 31.0),
                ("Iowa".to_string(), 27.0),
                ("Utah".to_string(), 22.0),
            ]
        );
    }

    #[test]
    fn test_yearly_means_by_class() {
        let series = yearly_means_by_class(&nutrition_table());
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, "Obesity");
        assert_eq!(series[0].1, vec![(2019.0, 32.0), (2020.0, 32.0)]);
        assert_eq!(series[1].1, vec![(2020.0, 20.0), (2021.0, 22.0)]);
    }

    #[test]
    fn test_visualize_renders_full_chart_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = crate::store::MemoryStore::new();
        store
            .insert_many(EV_DATASET.cleaned_collection, ev_table(6).into_documents())
            .unwrap();
        store
            .insert_many(
                NUTRITION_DATASET.cleaned_collection,
                nutrition_table().into_documents(),
            )
            .unwrap();

        let mut config = PipelineConfig::default();
        config.outputs.visualization_dir = dir.path().join("viz");
        let report = visualize(&store, &config).unwrap();

        let names: Vec<String> = report
            .directory_listing
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        assert_eq!(
            names,
            vec![
                "data_value_distributions.svg",
                "ev_distribution_Make.svg",
                "health_by_state.svg",
                "health_categories_bar.svg",
                "health_categories_pie.svg",
                "health_trends_by_category.svg",
                "health_trends_time_series.svg",
                "sample_size_vs_value.svg",
            ]
        );
        assert_eq!(report.written.len(), 8);
    }

    #[test]
    fn test_missing_columns_skip_charts() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = crate::store::MemoryStore::new();
        let mut config = PipelineConfig::default();
        config.outputs.visualization_dir = dir.path().to_path_buf();
        let report = visualize(&store, &config).unwrap();
        assert!(report.written.is_empty());
        assert!(report.directory_listing.is_empty());
    }
}
