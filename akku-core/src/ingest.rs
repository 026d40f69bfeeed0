//! Stage 1: download both datasets, cap them at `sample_size`, and replace the
//! raw collections.

use crate::config::PipelineConfig;
use crate::data::source::{DataSource, FetchedDataset};
use crate::datasets::{DatasetDescriptor, DatasetKind, Sampling};
use crate::error::PipelineError;
use crate::store::{Document, DocumentStore, Filter, METADATA_FLAG, ensure_reachable};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

/// Number of field names shown per collection in the ingestion summary.
const SUMMARY_FIELDS: usize = 10;

/// Result of ingesting one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetIngest {
    pub dataset: String,
    pub collection: String,
    pub total_available: usize,
    pub stored: usize,
    /// Set when the dataset was skipped because of a failure.
    pub error: Option<String>,
}

impl DatasetIngest {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// One line of the post-ingestion collection listing.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub documents: usize,
    pub sample_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub datasets: Vec<DatasetIngest>,
    pub collections: Vec<CollectionSummary>,
}

/// Run ingestion against the configured remote sources.
pub async fn ingest(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
) -> Result<IngestReport, PipelineError> {
    let sources: Vec<(&DatasetDescriptor, Box<dyn DataSource>)> = DatasetKind::ALL
        .iter()
        .map(|kind| {
            let descriptor = kind.descriptor();
            (descriptor, descriptor.source(config))
        })
        .collect();
    let borrowed: Vec<(&DatasetDescriptor, &dyn DataSource)> = sources
        .iter()
        .map(|(d, s)| (*d, s.as_ref()))
        .collect();
    ingest_from(store, config, &borrowed).await
}

/// Run ingestion with explicit sources.
///
/// Fails only when the store is unreachable; a failure on one dataset is
/// logged and recorded in the report while the others proceed.
pub async fn ingest_from(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    sources: &[(&DatasetDescriptor, &dyn DataSource)],
) -> Result<IngestReport, PipelineError> {
    ensure_reachable(store)?;
    info!(sample_size = config.sample_size, "Starting ingestion");

    let mut datasets = Vec::with_capacity(sources.len());
    for (descriptor, source) in sources {
        let outcome = match ingest_dataset(store, config, descriptor, *source).await {
            Ok((total_available, stored)) => {
                info!(
                    dataset = descriptor.name,
                    collection = descriptor.raw_collection,
                    total_available,
                    stored,
                    "Stored raw records"
                );
                DatasetIngest {
                    dataset: descriptor.name.to_string(),
                    collection: descriptor.raw_collection.to_string(),
                    total_available,
                    stored,
                    error: None,
                }
            }
            Err(e) => {
                error!(dataset = descriptor.name, error = %e, "Ingestion failed; dataset skipped");
                DatasetIngest {
                    dataset: descriptor.name.to_string(),
                    collection: descriptor.raw_collection.to_string(),
                    total_available: 0,
                    stored: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        datasets.push(outcome);
    }

    let collections = summarize_collections(store)?;
    for c in &collections {
        info!(
            collection = %c.name,
            documents = c.documents,
            fields = ?c.sample_fields,
            "Collection summary"
        );
    }

    Ok(IngestReport {
        datasets,
        collections,
    })
}

/// Fetch, cap, and replace one raw collection. Returns `(available, stored)`.
async fn ingest_dataset(
    store: &dyn DocumentStore,
    config: &PipelineConfig,
    descriptor: &DatasetDescriptor,
    source: &dyn DataSource,
) -> Result<(usize, usize), PipelineError> {
    info!(dataset = descriptor.name, "Fetching dataset");
    let api_url = source.source_info().location;
    let fetched = source.fetch().await?;
    info!(
        dataset = descriptor.name,
        columns = fetched.columns.len(),
        records = fetched.total_available,
        "Downloaded dataset"
    );

    let FetchedDataset {
        columns,
        column_metadata,
        records,
        total_available,
    } = fetched;

    let records = match descriptor.sampling {
        Sampling::ClientRandom => sample_records(records, config.sample_size, config.sampling_seed),
        Sampling::ServerLimit => {
            let mut records = records;
            if records.len() > config.sample_size {
                warn!(
                    dataset = descriptor.name,
                    returned = records.len(),
                    limit = config.sample_size,
                    "Server ignored the row limit; truncating"
                );
                records.truncate(config.sample_size);
            }
            records
        }
    };

    let now = chrono::Utc::now().to_rfc3339();
    let metadata = metadata_document(
        descriptor,
        &api_url,
        &now,
        columns,
        column_metadata,
        total_available,
        records.len(),
    );
    let tagged: Vec<Document> = records
        .into_iter()
        .map(|r| descriptor.tag_record(r, &now))
        .collect();

    store.clear(descriptor.raw_collection)?;
    store.insert_one(descriptor.raw_collection, metadata)?;
    let stored = if tagged.is_empty() {
        0
    } else {
        store.insert_many(descriptor.raw_collection, tagged)?.len()
    };
    Ok((total_available, stored))
}

/// Keep every record when there are at most `cap`; otherwise draw `cap`
/// records uniformly without replacement.
pub fn sample_records(records: Vec<Document>, cap: usize, seed: Option<u64>) -> Vec<Document> {
    if records.len() <= cap {
        return records;
    }
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let picked = rand::seq::index::sample(&mut rng, records.len(), cap);
    let mut slots: Vec<Option<Document>> = records.into_iter().map(Some).collect();
    picked
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

fn metadata_document(
    descriptor: &DatasetDescriptor,
    api_url: &str,
    downloaded_at: &str,
    columns: Vec<String>,
    column_metadata: Option<Value>,
    total_available: usize,
    sampled: usize,
) -> Document {
    let mut doc = Document::new();
    doc.insert("dataset_name".into(), json!(descriptor.name));
    doc.insert("source".into(), json!(descriptor.provider));
    doc.insert("format".into(), json!(descriptor.format));
    doc.insert("sdg_goals".into(), json!(descriptor.sdg_goals));
    doc.insert("downloaded_at".into(), json!(downloaded_at));
    doc.insert("api_url".into(), json!(api_url));
    doc.insert("columns".into(), json!(columns));
    if let Some(meta) = column_metadata {
        doc.insert("column_metadata".into(), meta);
    }
    doc.insert("total_available_records".into(), json!(total_available));
    doc.insert("sampled_records".into(), json!(sampled));
    doc.insert(
        "sampling_method".into(),
        json!(descriptor.sampling.method_label()),
    );
    doc.insert(METADATA_FLAG.into(), json!(true));
    doc
}

/// Every collection with its document count and the first field names of
/// one data record.
pub fn summarize_collections(
    store: &dyn DocumentStore,
) -> Result<Vec<CollectionSummary>, PipelineError> {
    let mut summaries = Vec::new();
    for name in store.list_collections()? {
        let documents = store.count(&name, &Filter::All)?;
        let sample_fields = store
            .find_one(&name, &Filter::data_records())?
            .map(|doc| doc.keys().take(SUMMARY_FIELDS).cloned().collect())
            .unwrap_or_default();
        summaries.push(CollectionSummary {
            name,
            documents,
            sample_fields,
        });
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::DataSourceInfo;
    use crate::datasets::{EV_DATASET, NUTRITION_DATASET};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct FixedSource(Vec<Document>);

    #[async_trait]
    impl DataSource for FixedSource {
        async fn fetch(&self) -> Result<FetchedDataset, PipelineError> {
            Ok(FetchedDataset {
                columns: vec!["n".into()],
                column_metadata: None,
                records: self.0.clone(),
                total_available: self.0.len(),
            })
        }

        fn source_info(&self) -> DataSourceInfo {
            DataSourceInfo {
                source_type: "fixed".into(),
                location: "memory://fixed".into(),
                accessed_at: chrono::Utc::now(),
            }
        }
    }

    struct FailingSource;

    #[async_trait]
    impl DataSource for FailingSource {
        async fn fetch(&self) -> Result<FetchedDataset, PipelineError> {
            Err(PipelineError::fetch("connection reset"))
        }

        fn source_info(&self) -> DataSourceInfo {
            DataSourceInfo {
                source_type: "failing".into(),
                location: "memory://failing".into(),
                accessed_at: chrono::Utc::now(),
            }
        }
    }

    fn rows(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| json!({ "n": i }).as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_sample_records_keeps_small_inputs_in_order() {
        let sampled = sample_records(rows(5), 10, None);
        let ns: Vec<_> = sampled.iter().map(|d| d["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_records_seeded_is_reproducible() {
        let a = sample_records(rows(100), 10, Some(42));
        let b = sample_records(rows(100), 10, Some(42));
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_previous_collection() {
        let store = MemoryStore::new();
        store
            .insert_many(NUTRITION_DATASET.raw_collection, rows(3))
            .unwrap();
        let ok = FixedSource(rows(4));
        let sources: [(&DatasetDescriptor, &dyn DataSource); 2] =
            [(&EV_DATASET, &ok), (&NUTRITION_DATASET, &FailingSource)];

        let report = ingest_from(&store, &PipelineConfig::default(), &sources)
            .await
            .unwrap();

        assert!(report.datasets[0].succeeded());
        assert!(!report.datasets[1].succeeded());
        assert_eq!(
            store
                .count(NUTRITION_DATASET.raw_collection, &Filter::All)
                .unwrap(),
            3
        );
        assert_eq!(
            store
                .count(EV_DATASET.raw_collection, &Filter::data_records())
                .unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn test_server_limited_dataset_is_truncated_to_cap() {
        let store = MemoryStore::new();
        let src = FixedSource(rows(10));
        let sources: [(&DatasetDescriptor, &dyn DataSource); 1] = [(&NUTRITION_DATASET, &src)];
        let config = PipelineConfig {
            sample_size: 4,
            ..PipelineConfig::default()
        };
        let report = ingest_from(&store, &config, &sources).await.unwrap();

        assert_eq!(report.datasets[0].stored, 4);
        let stored = store
            .find(NUTRITION_DATASET.raw_collection, &Filter::data_records())
            .unwrap();
        let ns: Vec<_> = stored.iter().map(|d| d["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![0, 1, 2, 3]);

        let meta = store
            .find_one(NUTRITION_DATASET.raw_collection, &Filter::metadata())
            .unwrap()
            .unwrap();
        assert_eq!(meta["sampled_records"], json!(4));
        assert_eq!(meta["sampling_method"], json!("API limit parameter"));
    }

    #[tokio::test]
    async fn test_metadata_document_is_flagged() {
        let store = MemoryStore::new();
        let src = FixedSource(rows(2));
        let sources: [(&DatasetDescriptor, &dyn DataSource); 1] = [(&EV_DATASET, &src)];
        ingest_from(&store, &PipelineConfig::default(), &sources)
            .await
            .unwrap();

        let meta = store
            .find_one(EV_DATASET.raw_collection, &Filter::metadata())
            .unwrap()
            .unwrap();
        assert_eq!(meta["sampled_records"], json!(2));
        assert_eq!(meta["sampling_method"], json!("random"));
        assert_eq!(meta["api_url"], json!("memory://fixed"));
        assert!(meta.get("column_metadata").is_none());
    }

    #[tokio::test]
    async fn test_summary_lists_sample_fields() {
        let store = MemoryStore::new();
        let src = FixedSource(rows(1));
        let sources: [(&DatasetDescriptor, &dyn DataSource); 1] = [(&EV_DATASET, &src)];
        let report = ingest_from(&store, &PipelineConfig::default(), &sources)
            .await
            .unwrap();
        let summary = &report.collections[0];
        assert_eq!(summary.name, "ev_data_raw");
        assert_eq!(summary.documents, 2);
        assert_eq!(
            summary.sample_fields,
            vec!["_id", "_imported_at", "_dataset_name", "_source", "n"]
        );
    }
}
