//! Remote data sources: the rows-view export and the flat resource API.

use crate::error::PipelineError;
use crate::store::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A downloaded dataset, already shaped into one document per source row.
#[derive(Debug, Clone, Default)]
pub struct FetchedDataset {
    /// Column names as declared by the source, or taken from the first record.
    pub columns: Vec<String>,
    /// Raw column descriptors when the source provides them.
    pub column_metadata: Option<Value>,
    pub records: Vec<Document>,
    /// Number of rows the source returned before any sampling.
    pub total_available: usize,
}

/// Information about a data source for provenance tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for fetching a dataset from somewhere.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self) -> Result<FetchedDataset, PipelineError>;

    fn source_info(&self) -> DataSourceInfo;
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value, PipelineError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(PipelineError::fetch(format!(
            "GET {url} failed with status {}",
            response.status()
        )));
    }
    let body = response.text().await?;
    tracing::debug!(url, bytes = body.len(), "Downloaded payload");
    Ok(serde_json::from_str(&body)?)
}

// ---------------------------------------------------------------------------
// RowsViewSource
// ---------------------------------------------------------------------------

/// Rows-view export: column names under `meta.view.columns`, rows as arrays
/// under `data`.
pub struct RowsViewSource {
    pub url: String,
    pub timeout: Duration,
}

impl RowsViewSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DataSource for RowsViewSource {
    async fn fetch(&self) -> Result<FetchedDataset, PipelineError> {
        let client = build_client(self.timeout)?;
        let payload = get_json(&client, &self.url).await?;
        parse_rows_view(payload)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "rows_view".to_string(),
            location: self.url.clone(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// Map a rows-view payload to documents by column position.
///
/// Columns without a name are called `col_<i>`; values past the last declared
/// column are dropped, and short rows simply lack the trailing keys.
pub fn parse_rows_view(payload: Value) -> Result<FetchedDataset, PipelineError> {
    let Value::Object(mut root) = payload else {
        return Err(PipelineError::dataset("rows-view payload must be an object"));
    };

    let column_metadata = root
        .get("meta")
        .and_then(|m| m.get("view"))
        .and_then(|v| v.get("columns"))
        .cloned();

    let columns: Vec<String> = match &column_metadata {
        Some(Value::Array(cols)) => cols
            .iter()
            .enumerate()
            .map(|(i, col)| {
                col.get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("col_{i}"))
            })
            .collect(),
        _ => Vec::new(),
    };

    let rows = match root.remove("data") {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(PipelineError::dataset("rows-view 'data' must be an array")),
        None => Vec::new(),
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let Value::Array(cells) = row else {
            return Err(PipelineError::dataset("rows-view rows must be arrays"));
        };
        records.push(columns.iter().cloned().zip(cells).collect::<Document>());
    }

    Ok(FetchedDataset {
        total_available: records.len(),
        columns,
        column_metadata,
        records,
    })
}

// ---------------------------------------------------------------------------
// ResourceSource
// ---------------------------------------------------------------------------

/// Flat resource API returning an array of objects. The row cap is enforced
/// by the server through the `$limit` query parameter.
pub struct ResourceSource {
    pub base_url: String,
    pub limit: usize,
    pub timeout: Duration,
}

impl ResourceSource {
    pub fn new(base_url: impl Into<String>, limit: usize, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            limit,
            timeout,
        }
    }

    /// Base URL with `$limit=<cap>` appended.
    pub fn request_url(&self) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}$limit={}", self.base_url, self.limit)
    }
}

#[async_trait]
impl DataSource for ResourceSource {
    async fn fetch(&self) -> Result<FetchedDataset, PipelineError> {
        let client = build_client(self.timeout)?;
        let payload = get_json(&client, &self.request_url()).await?;
        parse_resource(payload)
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "resource".to_string(),
            location: self.request_url(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// Each object of a flat array becomes one record as-is.
pub fn parse_resource(payload: Value) -> Result<FetchedDataset, PipelineError> {
    let Value::Array(items) = payload else {
        return Err(PipelineError::dataset(
            "resource payload must be a JSON array",
        ));
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(map) => records.push(map),
            other => {
                return Err(PipelineError::dataset(format!(
                    "resource rows must be objects, got {other}"
                )));
            }
        }
    }

    let columns = records
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();

    Ok(FetchedDataset {
        total_available: records.len(),
        columns,
        column_metadata: None,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_rows_view_maps_by_position() {
        let payload = json!({
            "meta": {"view": {"columns": [
                {"name": "VIN", "dataTypeName": "text"},
                {"name": "Model Year"},
                {"fieldName": "unnamed"}
            ]}},
            "data": [
                ["5YJ3E", 2020, "x", "extra"],
                ["1N4AZ", 2018]
            ]
        });
        let ds = parse_rows_view(payload).unwrap();
        assert_eq!(ds.columns, vec!["VIN", "Model Year", "col_2"]);
        assert_eq!(ds.total_available, 2);
        assert_eq!(
            Value::Object(ds.records[0].clone()),
            json!({"VIN": "5YJ3E", "Model Year": 2020, "col_2": "x"})
        );
        assert_eq!(ds.records[1].len(), 2);
        assert!(ds.column_metadata.is_some());
    }

    #[test]
    fn test_parse_rows_view_rejects_non_object() {
        assert!(parse_rows_view(json!([1, 2])).is_err());
        assert!(parse_rows_view(json!({"data": "nope"})).is_err());
    }

    #[test]
    fn test_parse_resource_keeps_objects() {
        let payload = json!([
            {"yearstart": "2019", "data_value": "31.2"},
            {"yearstart": "2020", "class": "Obesity"}
        ]);
        let ds = parse_resource(payload).unwrap();
        assert_eq!(ds.records.len(), 2);
        assert_eq!(ds.columns, vec!["yearstart", "data_value"]);
        assert_eq!(ds.records[1].get("class"), Some(&json!("Obesity")));
        assert!(ds.column_metadata.is_none());
    }

    #[test]
    fn test_parse_resource_rejects_scalars() {
        assert!(parse_resource(json!({"a": 1})).is_err());
        assert!(parse_resource(json!([1])).is_err());
    }

    #[test]
    fn test_resource_request_url() {
        let src = ResourceSource::new("https://example.com/r.json", 2500, Duration::from_secs(5));
        assert_eq!(src.request_url(), "https://example.com/r.json?$limit=2500");
        let src = ResourceSource::new("https://example.com/r.json?x=1", 10, Duration::from_secs(5));
        assert_eq!(src.request_url(), "https://example.com/r.json?x=1&$limit=10");
        assert_eq!(src.source_info().source_type, "resource");
    }
}
