//! In-memory [`DocumentStore`] implementation for testing.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock` for thread
//! safety. Batch atomicity is trivial here (the whole map is mutated under
//! one write lock); the value of this backend is letting driver tests
//! observe exact store state without a database file.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{apply_write, remove_field_path, DocumentStore, FieldMap, WriteOp};

type Collection = BTreeMap<String, FieldMap>;

/// In-memory store keyed by collection name.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a document directly, bypassing batch plumbing. Test setup only.
    pub fn insert(&self, collection: &str, key: &str, fields: FieldMap) {
        let mut guard = self.collections.write().unwrap();
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), fields);
    }

    /// Fetch one document's fields, if present.
    pub fn get(&self, collection: &str, key: &str) -> Option<FieldMap> {
        let guard = self.collections.read().unwrap();
        guard.get(collection).and_then(|c| c.get(key)).cloned()
    }

    /// All keys of a collection in sorted order.
    pub fn keys(&self, collection: &str) -> Vec<String> {
        let guard = self.collections.read().unwrap();
        guard
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list(&self, collection: &str) -> Result<Vec<(String, FieldMap)>> {
        let guard = self.collections.read().unwrap();
        Ok(guard
            .get(collection)
            .map(|c| c.iter().map(|(k, f)| (k.clone(), f.clone())).collect())
            .unwrap_or_default())
    }

    async fn batch_write(&self, collection: &str, writes: &[WriteOp]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut guard = self.collections.write().unwrap();
        let coll = guard.entry(collection.to_string()).or_default();
        for op in writes {
            let existing = coll.remove(&op.key);
            coll.insert(op.key.clone(), apply_write(existing, op, now));
        }
        Ok(())
    }

    async fn batch_delete(&self, collection: &str, keys: &[String]) -> Result<()> {
        let mut guard = self.collections.write().unwrap();
        if let Some(coll) = guard.get_mut(collection) {
            for key in keys {
                coll.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_field(&self, collection: &str, key: &str, field_path: &str) -> Result<()> {
        let mut guard = self.collections.write().unwrap();
        if let Some(fields) = guard.get_mut(collection).and_then(|c| c.get_mut(key)) {
            remove_field_path(fields, field_path);
        }
        Ok(())
    }
}
