//! SQLite-backed document store. Each document is one JSON row scoped by
//! database and collection name.

use super::{Document, DocumentStore, Filter, ID_FIELD, new_document_id, with_leading_id};
use crate::error::PipelineError;
use rusqlite::{Connection, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    database   TEXT NOT NULL,
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(database, collection);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    database: String,
}

impl SqliteStore {
    /// Open (or create) the store file at `path`, scoped to `database`.
    pub fn open(path: &Path, database: &str) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| {
            PipelineError::store_unavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::with_connection(conn, database)
    }

    pub fn open_in_memory(database: &str) -> Result<Self, PipelineError> {
        Self::with_connection(Connection::open_in_memory()?, database)
    }

    fn with_connection(conn: Connection, database: &str) -> Result<Self, PipelineError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            database: database.to_string(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PipelineError> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::store("sqlite connection lock poisoned"))
    }
}

impl DocumentStore for SqliteStore {
    fn ping(&self) -> Result<(), PipelineError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| PipelineError::store_unavailable(e.to_string()))
    }

    fn clear(&self, collection: &str) -> Result<usize, PipelineError> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "DELETE FROM documents WHERE database = ?1 AND collection = ?2",
            params![self.database, collection],
        )?)
    }

    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<Vec<String>, PipelineError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(docs.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO documents (database, collection, id, body) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for mut doc in docs {
                let id = new_document_id();
                doc.remove(ID_FIELD);
                let body = serde_json::to_string(&doc)?;
                stmt.execute(params![self.database, collection, id, body])?;
                ids.push(id);
            }
        }
        tx.commit()?;
        Ok(ids)
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, PipelineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents WHERE database = ?1 AND collection = ?2 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![self.database, collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            let doc = match serde_json::from_str::<Value>(&body)? {
                Value::Object(map) => with_leading_id(id, map),
                other => {
                    return Err(PipelineError::store(format!(
                        "document {id} in '{collection}' is not an object: {other}"
                    )));
                }
            };
            if filter.matches(&doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    fn list_collections(&self) -> Result<Vec<String>, PipelineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection FROM documents WHERE database = ?1 ORDER BY collection",
        )?;
        let names = stmt
            .query_map(params![self.database], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_field_order() {
        let store = SqliteStore::open_in_memory("Test").unwrap();
        store
            .insert_one("raw", doc(json!({"zeta": 1, "alpha": "a", "mid": null})))
            .unwrap();

        let found = store.find("raw", &Filter::All).unwrap();
        let keys: Vec<_> = found[0].keys().cloned().collect();
        assert_eq!(keys, vec!["_id", "zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_databases_are_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let a = SqliteStore::open(&path, "A").unwrap();
        let b = SqliteStore::open(&path, "B").unwrap();

        a.insert_one("shared", doc(json!({"x": 1}))).unwrap();

        assert_eq!(a.count("shared", &Filter::All).unwrap(), 1);
        assert_eq!(b.count("shared", &Filter::All).unwrap(), 0);
        assert!(b.list_collections().unwrap().is_empty());
    }

    #[test]
    fn test_clear_and_filter() {
        let store = SqliteStore::open_in_memory("Test").unwrap();
        store.insert_one("raw", doc(json!({"is_metadata": true}))).unwrap();
        store
            .insert_many("raw", vec![doc(json!({"v": 1})), doc(json!({"v": 2}))])
            .unwrap();

        assert_eq!(store.count("raw", &Filter::data_records()).unwrap(), 2);
        assert_eq!(store.clear("raw").unwrap(), 3);
        assert_eq!(store.count("raw", &Filter::All).unwrap(), 0);
    }

    #[test]
    fn test_ping_and_persistence_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.db");
        {
            let store = SqliteStore::open(&path, "P").unwrap();
            store.ping().unwrap();
            store.insert_one("c", doc(json!({"k": "v"}))).unwrap();
        }
        let reopened = SqliteStore::open(&path, "P").unwrap();
        assert_eq!(reopened.list_collections().unwrap(), vec!["c"]);
    }
}
