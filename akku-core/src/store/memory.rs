//! In-memory document store, used by tests and dry runs.

use super::{Document, DocumentStore, Filter, new_document_id, with_leading_id};
use crate::error::PipelineError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<Document>>>, PipelineError> {
        self.collections
            .lock()
            .map_err(|_| PipelineError::store("memory store lock poisoned"))
    }
}

impl DocumentStore for MemoryStore {
    fn ping(&self) -> Result<(), PipelineError> {
        self.lock().map(|_| ())
    }

    fn clear(&self, collection: &str) -> Result<usize, PipelineError> {
        Ok(self
            .lock()?
            .remove(collection)
            .map(|docs| docs.len())
            .unwrap_or(0))
    }

    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<Vec<String>, PipelineError> {
        let mut collections = self.lock()?;
        let target = collections.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = new_document_id();
            target.push(with_leading_id(id.clone(), doc));
            ids.push(id);
        }
        Ok(ids)
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, PipelineError> {
        Ok(self
            .lock()?
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    fn list_collections(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ID_FIELD;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_assigns_ids() {
        let store = MemoryStore::new();
        let ids = store
            .insert_many("raw", vec![doc(json!({"a": 1})), doc(json!({"a": 2}))])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let docs = store.find("raw", &Filter::All).unwrap();
        assert_eq!(docs[0].get(ID_FIELD), Some(&json!(ids[0])));
        assert_eq!(docs[0].keys().next().map(String::as_str), Some(ID_FIELD));
    }

    #[test]
    fn test_count_with_filter() {
        let store = MemoryStore::new();
        store.insert_one("raw", doc(json!({"is_metadata": true}))).unwrap();
        store
            .insert_many("raw", vec![doc(json!({"a": 1})), doc(json!({"a": 2}))])
            .unwrap();
        assert_eq!(store.count("raw", &Filter::All).unwrap(), 3);
        assert_eq!(store.count("raw", &Filter::data_records()).unwrap(), 2);
        assert_eq!(store.count("raw", &Filter::metadata()).unwrap(), 1);
    }

    #[test]
    fn test_list_collections_skips_empty() {
        let store = MemoryStore::new();
        store.insert_one("b", doc(json!({"x": 1}))).unwrap();
        store.insert_one("a", doc(json!({"x": 1}))).unwrap();
        store.clear("b").unwrap();
        assert_eq!(store.list_collections().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_find_unknown_collection_is_empty() {
        let store = MemoryStore::new();
        assert!(store.find("missing", &Filter::All).unwrap().is_empty());
        assert_eq!(store.clear("missing").unwrap(), 0);
    }
}
