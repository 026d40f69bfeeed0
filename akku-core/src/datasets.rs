//! The two datasets the pipeline knows about, and everything each stage needs
//! to know about them.

use crate::config::PipelineConfig;
use crate::data::source::{DataSource, ResourceSource, RowsViewSource};
use crate::persistence::file_stem_for;
use crate::store::{Document, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provenance fields added to every raw record at ingestion.
pub const IMPORTED_AT_FIELD: &str = "_imported_at";
pub const DATASET_NAME_FIELD: &str = "_dataset_name";
pub const SOURCE_FIELD: &str = "_source";

/// Fields added by cleaning.
pub const PROCESSED_AT_FIELD: &str = "_processed_at";
pub const RECORD_ID_FIELD: &str = "_record_id";

/// Fields stripped from raw records before cleaning.
pub const INTERNAL_FIELDS: [&str; 4] = [ID_FIELD, IMPORTED_AT_FIELD, DATASET_NAME_FIELD, SOURCE_FIELD];

/// True for pipeline bookkeeping columns, which analysis skips.
pub fn is_internal_column(name: &str) -> bool {
    name.starts_with('_')
}

/// How a dataset's stored volume is capped at `sample_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Download everything, then draw a uniform random sample locally.
    ClientRandom,
    /// Ask the server for at most `sample_size` rows.
    ServerLimit,
}

impl Sampling {
    /// Label recorded in the metadata document.
    pub fn method_label(self) -> &'static str {
        match self {
            Sampling::ClientRandom => "random",
            Sampling::ServerLimit => "API limit parameter",
        }
    }
}

/// Static description of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    ElectricVehicles,
    Nutrition,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::ElectricVehicles, DatasetKind::Nutrition];

    pub fn descriptor(self) -> &'static DatasetDescriptor {
        match self {
            DatasetKind::ElectricVehicles => &EV_DATASET,
            DatasetKind::Nutrition => &NUTRITION_DATASET,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub kind: DatasetKind,
    /// Human-readable dataset name, stored as `dataset_name` and `_dataset_name`.
    pub name: &'static str,
    /// Provider stored in the metadata document's `source`.
    pub provider: &'static str,
    /// Short source label stored on each raw record as `_source`.
    pub record_source: &'static str,
    pub format: &'static str,
    pub sdg_goals: &'static [&'static str],
    pub raw_collection: &'static str,
    pub cleaned_collection: &'static str,
    pub sampling: Sampling,
    /// Columns always coerced to numeric.
    pub numeric_columns: &'static [&'static str],
    /// Whether other columns are coerced when their first present value
    /// looks numeric. Off for datasets whose ID columns hold digit strings.
    pub infers_types: bool,
    /// Whether the nutrition-specific derived columns apply.
    pub derives_ranges: bool,
}

pub static EV_DATASET: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::ElectricVehicles,
    name: "Electric Vehicle Population Data",
    provider: "Washington State Department of Licensing",
    record_source: "Washington State DOL",
    format: "JSON (Semi-structured)",
    sdg_goals: &[
        "Goal 7: Clean Energy",
        "Goal 11: Sustainable Cities",
        "Goal 13: Climate Action",
    ],
    raw_collection: "ev_data_raw",
    cleaned_collection: "ev_data_cleaned",
    sampling: Sampling::ClientRandom,
    numeric_columns: &[],
    infers_types: true,
    derives_ranges: false,
};

pub static NUTRITION_DATASET: DatasetDescriptor = DatasetDescriptor {
    kind: DatasetKind::Nutrition,
    name: "Nutrition, Physical Activity, and Obesity - BRFSS",
    provider: "CDC Behavioral Risk Factor Surveillance System",
    record_source: "CDC - Behavioral Risk Factor Surveillance System",
    format: "JSON API (Structured)",
    sdg_goals: &["Goal 2: Zero Hunger", "Goal 3: Good Health and Well-being"],
    raw_collection: "nutrition_data_raw",
    cleaned_collection: "nutrition_data_cleaned",
    sampling: Sampling::ServerLimit,
    numeric_columns: &[
        "data_value",
        "data_value_alt",
        "low_confidence_limit",
        "high_confidence_limit",
        "sample_size",
        "yearstart",
        "yearend",
    ],
    infers_types: false,
    derives_ranges: true,
};

impl DatasetDescriptor {
    /// Remote source for this dataset under the given configuration.
    pub fn source(&self, config: &PipelineConfig) -> Box<dyn DataSource> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        match self.sampling {
            Sampling::ClientRandom => {
                Box::new(RowsViewSource::new(config.sources.ev_url.clone(), timeout))
            }
            Sampling::ServerLimit => Box::new(ResourceSource::new(
                config.sources.nutrition_url.clone(),
                config.sample_size,
                timeout,
            )),
        }
    }

    /// `<csv_dir>/<raw collection stem>_cleaned.csv`
    pub fn csv_path(&self, csv_dir: &Path) -> PathBuf {
        let stem = self
            .raw_collection
            .strip_suffix("_raw")
            .unwrap_or(self.raw_collection);
        csv_dir.join(format!("{}_cleaned.csv", file_stem_for(stem)))
    }

    /// Tag a fetched row with its provenance fields. The provenance keys come
    /// first, followed by the row's own fields.
    pub fn tag_record(&self, record: Document, imported_at: &str) -> Document {
        let mut doc = Document::new();
        doc.insert(IMPORTED_AT_FIELD.into(), Value::from(imported_at));
        doc.insert(DATASET_NAME_FIELD.into(), Value::from(self.name));
        doc.insert(SOURCE_FIELD.into(), Value::from(self.record_source));
        for (key, value) in record {
            doc.insert(key, value);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_path_uses_raw_stem() {
        let dir = Path::new("/out");
        assert_eq!(
            EV_DATASET.csv_path(dir),
            PathBuf::from("/out/ev_data_cleaned.csv")
        );
        assert_eq!(
            NUTRITION_DATASET.csv_path(dir),
            PathBuf::from("/out/nutrition_data_cleaned.csv")
        );
    }

    #[test]
    fn test_tag_record_prefixes_provenance() {
        let record = json!({"VIN": "5YJ3E"}).as_object().cloned().unwrap();
        let doc = EV_DATASET.tag_record(record, "2024-01-01T00:00:00Z");
        let keys: Vec<_> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_imported_at", "_dataset_name", "_source", "VIN"]);
        assert_eq!(doc["_source"], json!("Washington State DOL"));
    }

    #[test]
    fn test_descriptor_lookup() {
        assert_eq!(DatasetKind::Nutrition.descriptor().raw_collection, "nutrition_data_raw");
        assert_eq!(Sampling::ServerLimit.method_label(), "API limit parameter");
        assert!(INTERNAL_FIELDS.iter().all(|f| is_internal_column(f)));
        assert!(!is_internal_column("data_value"));
    }
}
