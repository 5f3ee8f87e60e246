//! Store inspection.
//!
//! Lists a collection's keys, or prints one document as JSON. Used by the
//! `seedsync get` CLI command; integration tests read store state through
//! it as well.

use anyhow::{bail, Result};

use crate::store::{fields_to_json, DocumentStore};

/// Print all keys of a collection, or one document's fields as pretty
/// JSON when `key` is given.
pub async fn run_get(
    store: &dyn DocumentStore,
    collection: &str,
    key: Option<&str>,
) -> Result<()> {
    let docs = store.list(collection).await?;

    match key {
        None => {
            println!("{} ({} documents)", collection, docs.len());
            for (doc_key, _) in &docs {
                println!("  {}", doc_key);
            }
        }
        Some(wanted) => {
            let Some((_, fields)) = docs.iter().find(|(k, _)| k == wanted) else {
                bail!("No document '{}' in collection '{}'", wanted, collection);
            };
            println!("{}", serde_json::to_string_pretty(&fields_to_json(fields)?)?);
        }
    }
    Ok(())
}
