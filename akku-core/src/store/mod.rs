//! Document store abstraction: named collections of schemaless JSON documents.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::PipelineError;
use serde_json::Value;

/// A schemaless document. Key order is insertion order.
pub type Document = serde_json::Map<String, Value>;

/// Field holding the store-assigned document identifier.
pub const ID_FIELD: &str = "_id";

/// Field marking the provenance document of a raw collection.
pub const METADATA_FLAG: &str = "is_metadata";

/// Query filter over a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Field is present and equal to the value.
    Eq(String, Value),
    /// Field is absent or not equal to the value.
    Ne(String, Value),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    /// Every document except the metadata document.
    pub fn data_records() -> Self {
        Self::ne(METADATA_FLAG, true)
    }

    /// Only the metadata document.
    pub fn metadata() -> Self {
        Self::eq(METADATA_FLAG, true)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::Ne(field, value) => doc.get(field) != Some(value),
        }
    }
}

/// Operations the pipeline stages need from a document store.
pub trait DocumentStore: Send + Sync {
    /// Verify the store is reachable.
    fn ping(&self) -> Result<(), PipelineError>;

    /// Remove every document in a collection. Returns how many were removed.
    fn clear(&self, collection: &str) -> Result<usize, PipelineError>;

    /// Insert documents, assigning each an `_id`. Returns the assigned ids.
    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<Vec<String>, PipelineError>;

    /// Documents matching `filter`, in insertion order, with `_id` as the
    /// first key.
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, PipelineError>;

    /// Names of collections holding at least one document.
    fn list_collections(&self) -> Result<Vec<String>, PipelineError>;

    fn insert_one(&self, collection: &str, doc: Document) -> Result<String, PipelineError> {
        self.insert_many(collection, vec![doc])?
            .pop()
            .ok_or_else(|| PipelineError::store("insert returned no id"))
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize, PipelineError> {
        Ok(self.find(collection, filter)?.len())
    }

    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, PipelineError> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }
}

/// Clear a collection and bulk-insert `docs` into it.
///
/// Not transactional: a failure after the clear leaves the collection
/// partially populated.
pub fn replace_collection(
    store: &dyn DocumentStore,
    collection: &str,
    docs: Vec<Document>,
) -> Result<usize, PipelineError> {
    let removed = store.clear(collection)?;
    tracing::debug!(collection, removed, "Cleared collection");
    let inserted = if docs.is_empty() {
        0
    } else {
        store.insert_many(collection, docs)?.len()
    };
    Ok(inserted)
}

/// Fail with [`PipelineError::StoreUnavailable`] when the store cannot be reached.
pub fn ensure_reachable(store: &dyn DocumentStore) -> Result<(), PipelineError> {
    store.ping().map_err(|e| match e {
        PipelineError::StoreUnavailable(_) => e,
        other => PipelineError::store_unavailable(other.to_string()),
    })
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Rebuild `doc` with `id` as its first key, replacing any stored `_id`.
pub(crate) fn with_leading_id(id: String, doc: Document) -> Document {
    let mut out = Document::with_capacity(doc.len() + 1);
    out.insert(ID_FIELD.to_string(), Value::String(id));
    out.extend(doc.into_iter().filter(|(key, _)| key != ID_FIELD));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let filter = Filter::data_records();
        assert!(filter.matches(&doc(json!({"a": 1}))));
        assert!(filter.matches(&doc(json!({"is_metadata": false}))));
        assert!(!filter.matches(&doc(json!({"is_metadata": true}))));
    }

    #[test]
    fn test_eq_requires_presence() {
        let filter = Filter::metadata();
        assert!(!filter.matches(&doc(json!({"a": 1}))));
        assert!(filter.matches(&doc(json!({"is_metadata": true}))));
    }

    #[test]
    fn test_replace_collection_clears_first() {
        let store = MemoryStore::new();
        store
            .insert_many("c", vec![doc(json!({"old": 1})), doc(json!({"old": 2}))])
            .unwrap();

        let inserted = replace_collection(&store, "c", vec![doc(json!({"new": 1}))]).unwrap();

        assert_eq!(inserted, 1);
        let docs = store.find("c", &Filter::All).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("new"), Some(&json!(1)));
    }

    #[test]
    fn test_replace_collection_with_nothing_empties_it() {
        let store = MemoryStore::new();
        store.insert_one("c", doc(json!({"old": 1}))).unwrap();
        assert_eq!(replace_collection(&store, "c", Vec::new()).unwrap(), 0);
        assert_eq!(store.count("c", &Filter::All).unwrap(), 0);
    }
}
