//! Property-based tests for statistics, sampling and cleaning using proptest.

use proptest::prelude::*;
use serde_json::{Value, json};

use akku_core::clean::clean_table;
use akku_core::data::Table;
use akku_core::data::stats::{describe, histogram, median, pearson, value_counts};
use akku_core::datasets::{EV_DATASET, NUTRITION_DATASET, RECORD_ID_FIELD};
use akku_core::ingest::sample_records;
use akku_core::Document;

fn finite() -> impl Strategy<Value = f64> {
    -1.0e6..1.0e6f64
}

// --- Descriptive statistics ---

proptest! {
    #[test]
    fn histogram_counts_every_value(
        values in prop::collection::vec(finite(), 1..300),
        bins in 1usize..60,
    ) {
        let h = histogram(&values, bins);
        prop_assert_eq!(h.len(), bins);
        prop_assert_eq!(h.iter().map(|b| b.2).sum::<usize>(), values.len());
    }

    #[test]
    fn median_lies_within_range(values in prop::collection::vec(finite(), 1..200)) {
        let m = median(&values).unwrap();
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(lo <= m && m <= hi);
    }

    #[test]
    fn quartiles_are_ordered(values in prop::collection::vec(finite(), 1..200)) {
        let d = describe(&values);
        prop_assert_eq!(d.count, values.len());
        let (min, q25, q50, q75, max) = (
            d.min.unwrap(),
            d.q25.unwrap(),
            d.q50.unwrap(),
            d.q75.unwrap(),
            d.max.unwrap(),
        );
        prop_assert!(min <= q25 && q25 <= q50 && q50 <= q75 && q75 <= max);
    }

    #[test]
    fn pearson_is_bounded(
        pairs in prop::collection::vec((prop::option::of(finite()), prop::option::of(finite())), 0..100)
    ) {
        let (x, y): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        if let Some(r) = pearson(&x, &y) {
            prop_assert!((-1.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn value_counts_cover_present_cells(
        cells in prop::collection::vec(prop::option::of(0u8..6), 0..100)
    ) {
        let values: Vec<Value> = cells
            .iter()
            .map(|c| c.map(|n| json!(format!("v{n}"))).unwrap_or(Value::Null))
            .collect();
        let counts = value_counts(&values);
        let present = cells.iter().filter(|c| c.is_some()).count();
        prop_assert_eq!(counts.iter().map(|(_, n)| n).sum::<usize>(), present);
        prop_assert!(counts.windows(2).all(|w| w[0].1 >= w[1].1));
    }
}

// --- Sampling ---

fn numbered(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let mut d = Document::new();
            d.insert("n".into(), json!(i));
            d
        })
        .collect()
}

proptest! {
    #[test]
    fn sampling_caps_without_duplicates(
        n in 0usize..400,
        cap in 1usize..300,
        seed in any::<u64>(),
    ) {
        let sampled = sample_records(numbered(n), cap, Some(seed));
        prop_assert_eq!(sampled.len(), n.min(cap));
        let mut ids: Vec<u64> = sampled.iter().map(|d| d["n"].as_u64().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), n.min(cap));
    }

    #[test]
    fn seeded_sampling_is_reproducible(n in 0usize..300, cap in 1usize..100, seed in any::<u64>()) {
        prop_assert_eq!(
            sample_records(numbered(n), cap, Some(seed)),
            sample_records(numbered(n), cap, Some(seed))
        );
    }
}

// --- Cleaning ---

fn cell() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        (0i64..1000).prop_map(|n| json!(n.to_string())),
        (0.0..100.0f64).prop_map(|f| json!(format!("{f:.2}"))),
        "[a-z]{1,6}".prop_map(Value::String),
    ]
}

fn raw_table() -> impl Strategy<Value = Table> {
    (1usize..5, 0usize..40).prop_flat_map(|(cols, rows)| {
        prop::collection::vec(prop::collection::vec(cell(), cols), rows).prop_map(move |rows| {
            Table {
                columns: (0..cols).map(|i| format!("col_{i}")).collect(),
                rows,
            }
        })
    })
}

proptest! {
    #[test]
    fn cleaned_tables_have_no_missing_values(mut table in raw_table(), nutrition in any::<bool>()) {
        let descriptor = if nutrition { &NUTRITION_DATASET } else { &EV_DATASET };
        let rows = table.row_count();
        clean_table(&mut table, descriptor, "2024-01-01T00:00:00Z");
        prop_assert_eq!(table.row_count(), rows);
        prop_assert_eq!(table.total_nulls(), 0);

        let ids: Vec<i64> = table
            .column(RECORD_ID_FIELD)
            .unwrap()
            .into_iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        prop_assert_eq!(ids, (1..=rows as i64).collect::<Vec<_>>());
    }
}
