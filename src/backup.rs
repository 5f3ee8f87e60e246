//! Pre-mutation collection snapshots.
//!
//! Before a destructive operation (full overwrite, mass delete) the
//! affected collection is written to a timestamped JSON file. If the
//! snapshot cannot be written the run aborts before any mutation is
//! attempted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::store::{fields_to_json, DocumentStore};

/// Snapshot every document of `collection` to
/// `<dir>/backup_<collection>_<YYYYmmdd_HHMMSS>.json` and return the
/// written path.
pub async fn backup_collection(
    store: &dyn DocumentStore,
    collection: &str,
    dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create backup directory: {}", dir.display()))?;

    let docs = store.list(collection).await?;
    let mut snapshot = Vec::with_capacity(docs.len());
    for (key, fields) in &docs {
        snapshot.push(serde_json::json!({
            "key": key,
            "fields": fields_to_json(fields)?,
        }));
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("backup_{}_{}.json", collection, stamp));
    let payload = serde_json::to_string_pretty(&serde_json::Value::Array(snapshot))?;
    std::fs::write(&path, payload)
        .with_context(|| format!("Failed to write backup file: {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::{FieldMap, Value};

    #[tokio::test]
    async fn test_backup_writes_full_snapshot() {
        let store = InMemoryStore::new();
        let mut fields = FieldMap::new();
        fields.insert("display_name".into(), Value::text("계란"));
        fields.insert("is_major".into(), Value::Bool(true));
        store.insert("allergens", "계란", fields);

        let dir = tempfile::tempdir().unwrap();
        let path = backup_collection(&store, "allergens", dir.path())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["key"], "계란");
        assert_eq!(parsed[0]["fields"]["display_name"], "계란");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("backup_allergens_"));
    }

    #[tokio::test]
    async fn test_backup_of_empty_collection_is_empty_array() {
        let store = InMemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = backup_collection(&store, "allergens", dir.path())
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[tokio::test]
    async fn test_unwritable_backup_dir_is_an_error() {
        let store = InMemoryStore::new();
        let result =
            backup_collection(&store, "allergens", Path::new("/proc/no/such/dir")).await;
        assert!(result.is_err());
    }
}
