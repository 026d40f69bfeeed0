//! Column-level transformation steps applied to a [`Table`].

use crate::data::table::{Table, display_value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// A transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Remove columns; absent names are ignored.
    DropColumns { columns: Vec<String> },
    /// Parse every cell as a number; failures become null.
    CoerceNumeric { column: String },
    /// Replace nulls with a fixed value.
    FillNull { column: String, value: Value },
    /// `target = "<left><separator><right>"` using display forms.
    JoinColumns {
        target: String,
        left: String,
        right: String,
        separator: String,
    },
    /// `target = minuend - subtrahend`.
    Subtract {
        target: String,
        minuend: String,
        subtrahend: String,
    },
    /// Same value in every row.
    Constant { column: String, value: Value },
    /// `start, start + 1, ...` down the table.
    Sequence { column: String, start: i64 },
}

impl TransformStep {
    /// Column the step writes to, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            TransformStep::DropColumns { .. } => None,
            TransformStep::CoerceNumeric { column }
            | TransformStep::FillNull { column, .. }
            | TransformStep::Constant { column, .. }
            | TransformStep::Sequence { column, .. } => Some(column),
            TransformStep::JoinColumns { target, .. } | TransformStep::Subtract { target, .. } => {
                Some(target)
            }
        }
    }
}

/// Record of a step applied, for the cleaning report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRecord {
    pub step: TransformStep,
    pub applied_at: DateTime<Utc>,
    pub cells_changed: usize,
}

/// A pipeline of transformation steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformPipeline {
    pub steps: Vec<TransformStep>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: TransformStep) {
        self.steps.push(step);
    }

    /// Apply every step in order, returning one record per step.
    pub fn apply(&self, table: &mut Table) -> Vec<TransformRecord> {
        self.steps
            .iter()
            .map(|step| {
                let cells_changed = apply_step(table, step);
                tracing::debug!(target_column = ?step.target(), cells_changed, "Applied transform");
                TransformRecord {
                    cells_changed,
                    step: step.clone(),
                    applied_at: Utc::now(),
                }
            })
            .collect()
    }
}

/// Apply a single step, returning how many cells it touched.
pub fn apply_step(table: &mut Table, step: &TransformStep) -> usize {
    match step {
        TransformStep::DropColumns { columns } => {
            let rows = table.row_count();
            columns
                .iter()
                .filter(|c| table.drop_column(c))
                .count()
                * rows
        }
        TransformStep::CoerceNumeric { column } => {
            let Some(idx) = table.column_index(column) else {
                return 0;
            };
            let parsed: Vec<Option<f64>> = table.values(idx).map(coerce_numeric).collect();
            let changed = table
                .values(idx)
                .zip(&parsed)
                .filter(|(before, after)| match (before, after) {
                    (Value::Number(n), Some(f)) => n.as_f64() != Some(*f),
                    (Value::Null, None) => false,
                    _ => true,
                })
                .count();
            let integral = parsed
                .iter()
                .all(|p| p.is_some_and(|f| f.fract() == 0.0 && f.abs() < MAX_EXACT_INT));
            let values = parsed
                .into_iter()
                .map(|p| match p {
                    Some(f) if integral => Value::from(f as i64),
                    Some(f) => float_value(f),
                    None => Value::Null,
                })
                .collect();
            table.set_column(column, values);
            changed
        }
        TransformStep::FillNull { column, value } => {
            let Some(idx) = table.column_index(column) else {
                return 0;
            };
            let mut filled = 0;
            for row in &mut table.rows {
                if let Some(cell) = row.get_mut(idx) {
                    if cell.is_null() {
                        *cell = value.clone();
                        filled += 1;
                    }
                }
            }
            filled
        }
        TransformStep::JoinColumns {
            target,
            left,
            right,
            separator,
        } => {
            let (Some(l), Some(r)) = (table.column_index(left), table.column_index(right)) else {
                return 0;
            };
            let values: Vec<Value> = table
                .values(l)
                .zip(table.values(r))
                .map(|(a, b)| {
                    Value::String(format!("{}{separator}{}", display_value(a), display_value(b)))
                })
                .collect();
            let n = values.len();
            table.set_column(target, values);
            n
        }
        TransformStep::Subtract {
            target,
            minuend,
            subtrahend,
        } => {
            let (Some(a), Some(b)) = (table.column_index(minuend), table.column_index(subtrahend))
            else {
                return 0;
            };
            let values: Vec<Value> = table
                .values(a)
                .zip(table.values(b))
                .map(|(x, y)| subtract(x, y))
                .collect();
            let n = values.len();
            table.set_column(target, values);
            n
        }
        TransformStep::Constant { column, value } => {
            let n = table.row_count();
            table.set_column(column, vec![value.clone(); n]);
            n
        }
        TransformStep::Sequence { column, start } => {
            let n = table.row_count();
            let values = (0..n as i64).map(|i| Value::from(start + i)).collect();
            table.set_column(column, values);
            n
        }
    }
}

/// Best-effort numeric parse of a single cell.
///
/// Numbers pass through, booleans become 1/0, strings are trimmed and parsed
/// as floats. Anything else, or a non-finite result, is missing.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn subtract(x: &Value, y: &Value) -> Value {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        if let Some(d) = a.checked_sub(b) {
            return Value::from(d);
        }
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => float_value(a - b),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_drop_columns_ignores_absent() {
        let mut t = table(&["a", "b", "c"], vec![vec![json!(1), json!(2), json!(3)]]);
        let step = TransformStep::DropColumns {
            columns: vec!["b".into(), "zzz".into()],
        };
        apply_step(&mut t, &step);
        assert_eq!(t.columns, vec!["a", "c"]);
        assert_eq!(t.rows[0].len(), 2);
    }

    #[test]
    fn test_coerce_numeric_whole_column_becomes_integers() {
        let mut t = table(&["year"], vec![vec![json!("2019")], vec![json!(" 2020 ")]]);
        apply_step(
            &mut t,
            &TransformStep::CoerceNumeric {
                column: "year".into(),
            },
        );
        assert_eq!(t.rows[0][0], json!(2019));
        assert_eq!(t.rows[1][0], json!(2020));
        assert!(t.rows[0][0].is_i64());
    }

    #[test]
    fn test_coerce_numeric_with_failures_stays_float() {
        let mut t = table(
            &["v"],
            vec![vec![json!("12")], vec![json!("n/a")], vec![Value::Null]],
        );
        let changed = apply_step(&mut t, &TransformStep::CoerceNumeric { column: "v".into() });
        assert_eq!(t.rows[0][0], json!(12.0));
        assert!(t.rows[0][0].is_f64());
        assert!(t.rows[1][0].is_null());
        assert!(t.rows[2][0].is_null());
        assert_eq!(changed, 2);
    }

    #[test]
    fn test_coerce_numeric_cell() {
        assert_eq!(coerce_numeric(&json!("3.5")), Some(3.5));
        assert_eq!(coerce_numeric(&json!(true)), Some(1.0));
        assert_eq!(coerce_numeric(&json!("inf")), None);
        assert_eq!(coerce_numeric(&json!({"a": 1})), None);
        assert_eq!(coerce_numeric(&Value::Null), None);
    }

    #[test]
    fn test_fill_null() {
        let mut t = table(&["x"], vec![vec![Value::Null], vec![json!(5)]]);
        let pipeline = TransformPipeline::new().add_step(TransformStep::FillNull {
            column: "x".into(),
            value: json!(0),
        });
        let records = pipeline.apply(&mut t);
        assert_eq!(t.rows[0][0], json!(0));
        assert_eq!(t.rows[1][0], json!(5));
        assert_eq!(records[0].cells_changed, 1);
    }

    #[test]
    fn test_join_columns_uses_display_forms() {
        let mut t = table(
            &["start", "end"],
            vec![vec![json!(2019), json!(2020)], vec![json!(2019.0), json!(2021.0)]],
        );
        apply_step(
            &mut t,
            &TransformStep::JoinColumns {
                target: "range".into(),
                left: "start".into(),
                right: "end".into(),
                separator: "-".into(),
            },
        );
        assert_eq!(t.rows[0][2], json!("2019-2020"));
        assert_eq!(t.rows[1][2], json!("2019.0-2021.0"));
    }

    #[test]
    fn test_subtract_allows_negative() {
        let mut t = table(
            &["low", "high"],
            vec![vec![json!(10.5), json!(12.25)], vec![json!(8), json!(5)]],
        );
        apply_step(
            &mut t,
            &TransformStep::Subtract {
                target: "width".into(),
                minuend: "high".into(),
                subtrahend: "low".into(),
            },
        );
        assert_eq!(t.rows[0][2], json!(1.75));
        assert_eq!(t.rows[1][2], json!(-3));
    }

    #[test]
    fn test_sequence_and_constant() {
        let mut t = table(&["a"], vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]]);
        let pipeline = TransformPipeline::new()
            .add_step(TransformStep::Constant {
                column: "tag".into(),
                value: json!("t"),
            })
            .add_step(TransformStep::Sequence {
                column: "id".into(),
                start: 1,
            });
        pipeline.apply(&mut t);
        let ids: Vec<_> = t.values(2).cloned().collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(t.rows[2][1], json!("t"));
    }

    #[test]
    fn test_step_serde_tag() {
        let step = TransformStep::CoerceNumeric {
            column: "v".into(),
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("coerce_numeric"));
        assert_eq!(step.target(), Some("v"));
    }
}
