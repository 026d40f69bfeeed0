//! Row-major in-memory table built from store documents.

use crate::store::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

static NULL: Value = Value::Null;

/// A rectangular table of JSON cells. Missing cells are `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from documents. Columns appear in first-seen order across
    /// all documents; keys a document lacks become nulls.
    pub fn from_documents(docs: Vec<Document>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for doc in &docs {
            for key in doc.keys() {
                if !positions.contains_key(key) {
                    positions.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = docs
            .into_iter()
            .map(|doc| {
                let mut row = vec![Value::Null; columns.len()];
                for (key, value) in doc {
                    if let Some(&idx) = positions.get(&key) {
                        row[idx] = value;
                    }
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// Convert back into documents, one per row, keys in column order.
    pub fn into_documents(self) -> Vec<Document> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of the column at `idx`, top to bottom.
    pub fn values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| row.get(idx).unwrap_or(&NULL))
    }

    /// Cells of the named column, or `None` when the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        self.column_index(name).map(|idx| self.values(idx).collect())
    }

    /// Numeric cells of the named column, skipping nulls and non-numbers.
    pub fn numeric_values(&self, name: &str) -> Vec<f64> {
        self.column_index(name)
            .map(|idx| self.values(idx).filter_map(Value::as_f64).collect())
            .unwrap_or_default()
    }

    pub fn null_count(&self, idx: usize) -> usize {
        self.values(idx).filter(|v| v.is_null()).count()
    }

    pub fn total_nulls(&self) -> usize {
        (0..self.columns.len()).map(|i| self.null_count(i)).sum()
    }

    /// Missing-value counts for columns that have any, largest first.
    pub fn missing_summary(&self) -> Vec<(String, usize)> {
        let mut summary: Vec<(String, usize)> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), self.null_count(i)))
            .filter(|(_, n)| *n > 0)
            .collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1));
        summary
    }

    /// Set a column's cells, appending the column if it does not exist.
    ///
    /// `values` must have one entry per row.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Remove a column. Returns false when it was not present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            if idx < row.len() {
                row.remove(idx);
            }
        }
        true
    }
}

/// Render a cell the way it appears in reports, CSV files and derived strings.
///
/// Whole floats keep a trailing `.0`, nulls render as `nan`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "nan".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
