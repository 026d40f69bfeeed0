//! Descriptive statistics over column values.

use crate::data::table::display_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Summary of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Describe {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub q50: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

pub fn describe(values: &[f64]) -> Describe {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q = |p: f64| (!sorted.is_empty()).then(|| quantile_sorted(&sorted, p));
    Describe {
        count: values.len(),
        mean: mean(values),
        std: std_dev(values),
        min: sorted.first().copied(),
        q25: q(0.25),
        q50: q(0.5),
        q75: q(0.75),
        max: sorted.last().copied(),
    }
}

/// Pearson correlation over positions where both values are present.
///
/// `None` with fewer than two pairs or when either side has zero variance.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Square correlation matrix, row/column order as `columns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn correlation_matrix(columns: &[(String, Vec<Option<f64>>)]) -> CorrelationMatrix {
    let values = columns
        .iter()
        .map(|(_, x)| columns.iter().map(|(_, y)| pearson(x, y)).collect())
        .collect();
    CorrelationMatrix {
        columns: columns.iter().map(|(name, _)| name.clone()).collect(),
        values,
    }
}

/// Frequency of each distinct present value, most frequent first.
///
/// Ties keep first-appearance order.
pub fn value_counts<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for v in values {
        if v.is_null() {
            continue;
        }
        let key = display_value(v);
        match counts.get_mut(&key) {
            Some(c) => *c += 1,
            None => {
                counts.insert(key.clone(), 1);
                order.push(key);
            }
        }
    }
    let mut result: Vec<(String, usize)> = order
        .into_iter()
        .map(|k| {
            let c = counts[&k];
            (k, c)
        })
        .collect();
    result.sort_by(|a, b| b.1.cmp(&a.1));
    result
}

/// Number of distinct present values.
pub fn n_unique<'a>(values: impl IntoIterator<Item = &'a Value>) -> usize {
    value_counts(values).len()
}

/// Aggregates of a value column within one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub key: String,
    /// Numeric form of the key when it is a number, used for ordering and plotting.
    pub key_value: Option<f64>,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
}

/// Group `values` by `keys` and aggregate each group. Rows with a missing key
/// are skipped; missing values don't count. Groups with numeric keys come out
/// in ascending key order, otherwise in first-appearance order.
pub fn group_by<'a>(
    keys: impl IntoIterator<Item = &'a Value>,
    values: impl IntoIterator<Item = &'a Value>,
) -> Vec<GroupStats> {
    let mut order: Vec<(String, Option<f64>)> = Vec::new();
    let mut groups: HashMap<String, Vec<f64>> = HashMap::new();
    for (k, v) in keys.into_iter().zip(values) {
        if k.is_null() {
            continue;
        }
        let key = display_value(k);
        let bucket = groups.entry(key.clone()).or_insert_with(|| {
            order.push((key.clone(), k.as_f64()));
            Vec::new()
        });
        if let Some(x) = v.as_f64() {
            bucket.push(x);
        }
    }

    if order.iter().all(|(_, kv)| kv.is_some()) {
        order.sort_by(|a, b| a.1.unwrap_or(0.0).total_cmp(&b.1.unwrap_or(0.0)));
    }

    order
        .into_iter()
        .map(|(key, key_value)| {
            let xs = groups.remove(&key).unwrap_or_default();
            GroupStats {
                count: xs.len(),
                mean: mean(&xs),
                median: median(&xs),
                std: std_dev(&xs),
                key,
                key_value,
            }
        })
        .collect()
}

/// Equal-width histogram over `[min, max]`. Returns `(bin_start, bin_end, count)`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    };
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + width * i as f64, lo + width * (i + 1) as f64, c))
        .collect()
}
