//! Column type inference for tables.

use crate::data::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Json,
    Mixed,
    Null,
}

impl ColumnType {
    /// Numeric columns take median imputation and feed `describe`.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

/// Schema definition for a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaDefinition {
    pub fn dtype_of(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.dtype)
    }
}

/// Infer a column type from all of its present values.
///
/// A column is numeric only when every present value is a JSON number.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;
    let mut has_json = false;

    for v in values {
        match v {
            Value::Null => {}
            Value::Number(n) => {
                if n.is_f64() {
                    has_float = true;
                } else {
                    has_int = true;
                }
            }
            Value::Bool(_) => has_bool = true,
            Value::String(_) => has_string = true,
            Value::Array(_) | Value::Object(_) => has_json = true,
        }
    }

    let has_number = has_int || has_float;
    let kinds = [has_number, has_bool, has_string, has_json]
        .iter()
        .filter(|k| **k)
        .count();
    match kinds {
        0 => ColumnType::Null,
        1 if has_float => ColumnType::Float,
        1 if has_int => ColumnType::Integer,
        1 if has_bool => ColumnType::Boolean,
        1 if has_string => ColumnType::String,
        1 => ColumnType::Json,
        _ => ColumnType::Mixed,
    }
}

/// Infer the schema of every column in a table.
pub fn infer_schema(table: &Table) -> SchemaDefinition {
    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnSchema {
            name: name.clone(),
            dtype: infer_column_type(table.values(i)),
            nullable: table.null_count(i) > 0,
        })
        .collect();
    SchemaDefinition { columns }
}

/// First non-null value of a column.
pub fn first_present<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<&'a Value> {
    values.into_iter().find(|v| !v.is_null())
}

/// Decide from one sample value whether a column should be coerced to numeric.
///
/// The sample must be truthy (not `false`, not zero, not an empty string) and
/// a scalar; its string form with every `.` and `-` removed must be non-empty
/// ASCII digits. Only one value is inspected, so a column whose first value
/// looks numeric is coerced even when later values are not.
pub fn looks_numeric(sample: &Value) -> bool {
    let text = match sample {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => n.to_string(),
        _ => return false,
    };
    let stripped: String = text.chars().filter(|c| *c != '.' && *c != '-').collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}
