//! Report re-keying: moving user reports from generated ids to stable,
//! human-readable keys.
//!
//! New key shape: `<uid>_<created YYYYmmdd_HHMMSS>_<food>`. The move is
//! sequenced create-then-delete, never the reverse: a crash mid-move
//! leaves the report duplicated (recoverable by re-running) rather
//! than lost.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::schema::EntityType;
use crate::store::{DocumentStore, FieldMap, Value, WriteMode, WriteOp};

/// Longest food fragment carried into a key.
const FOOD_PART_MAX_CHARS: usize = 40;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RekeyStats {
    pub scanned: u64,
    pub moved: u64,
}

/// Sanitize a food name for use inside a document key: the store-forbidden
/// slash becomes a middle dot, whitespace runs collapse to single spaces,
/// and the result is capped at [`FOOD_PART_MAX_CHARS`] characters.
fn food_key_part(food: &str) -> String {
    let collapsed: String = food
        .replace('/', "·")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed.chars().take(FOOD_PART_MAX_CHARS).collect()
}

fn derive_key(fields: &FieldMap, fallback_created: i64) -> String {
    let uid = fields
        .get("uid")
        .and_then(Value::as_text)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");
    let created = fields
        .get("created_at")
        .and_then(Value::as_timestamp)
        .unwrap_or(fallback_created);
    let food = fields
        .get("food")
        .and_then(Value::as_text)
        .filter(|s| !s.is_empty())
        .unwrap_or("report");

    let stamp = Utc
        .timestamp_opt(created, 0)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y%m%d_%H%M%S");
    format!("{}_{}_{}", uid, stamp, food_key_part(food))
}

/// Rewrite every user-report key to the stable derived form.
///
/// Reports already under their derived key are left alone; colliding
/// targets are uniquified with `_1`, `_2`, … suffixes.
pub async fn rekey_reports(
    store: &dyn DocumentStore,
    dry_run: bool,
) -> Result<RekeyStats> {
    let collection = EntityType::UserReport.collection();
    let docs = store.list(collection).await?;
    let now = Utc::now().timestamp();

    let mut taken: HashSet<String> = docs.iter().map(|(key, _)| key.clone()).collect();
    let mut stats = RekeyStats {
        scanned: docs.len() as u64,
        ..RekeyStats::default()
    };

    for (old_key, fields) in docs {
        let base = derive_key(&fields, now);
        if old_key == base {
            continue;
        }

        let mut new_key = base.clone();
        let mut suffix = 1;
        while taken.contains(&new_key) {
            new_key = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        if dry_run {
            println!("[DRY] move {} {} -> {}", collection, old_key, new_key);
        } else {
            // Create first, delete second.
            store
                .batch_write(
                    collection,
                    &[WriteOp {
                        key: new_key.clone(),
                        fields: fields.clone(),
                        mode: WriteMode::Merge,
                    }],
                )
                .await?;
            store
                .batch_delete(collection, std::slice::from_ref(&old_key))
                .await?;
        }

        taken.remove(&old_key);
        taken.insert(new_key);
        stats.moved += 1;
    }

    println!("rekey user-reports{}", if dry_run { " (dry-run)" } else { "" });
    println!("  reports scanned: {}", stats.scanned);
    println!("  reports moved: {}", stats.moved);
    println!("ok");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn report(uid: &str, food: &str, created: i64) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("uid".into(), Value::text(uid));
        fields.insert("food".into(), Value::text(food));
        fields.insert("created_at".into(), Value::Timestamp(created));
        fields
    }

    #[tokio::test]
    async fn test_rekey_moves_to_derived_key() {
        let store = InMemoryStore::new();
        // 2023-11-14T22:13:20Z
        store.insert("user_reports", "random-uuid", report("u1", "김밥", 1_700_000_000));

        let stats = rekey_reports(&store, false).await.unwrap();
        assert_eq!(stats.moved, 1);
        assert_eq!(
            store.keys("user_reports"),
            vec!["u1_20231114_221320_김밥".to_string()]
        );
        // Fields travel with the move.
        let doc = store
            .get("user_reports", "u1_20231114_221320_김밥")
            .unwrap();
        assert_eq!(doc.get("food"), Some(&Value::text("김밥")));
    }

    #[tokio::test]
    async fn test_rekey_skips_already_good_keys() {
        let store = InMemoryStore::new();
        let fields = report("u1", "김밥", 1_700_000_000);
        store.insert("user_reports", "u1_20231114_221320_김밥", fields);

        let stats = rekey_reports(&store, false).await.unwrap();
        assert_eq!(stats.moved, 0);
    }

    #[tokio::test]
    async fn test_rekey_uniquifies_collisions() {
        let store = InMemoryStore::new();
        store.insert("user_reports", "a", report("u1", "김밥", 1_700_000_000));
        store.insert("user_reports", "b", report("u1", "김밥", 1_700_000_000));

        let stats = rekey_reports(&store, false).await.unwrap();
        assert_eq!(stats.moved, 2);
        let keys = store.keys("user_reports");
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"u1_20231114_221320_김밥".to_string()));
        assert!(keys.contains(&"u1_20231114_221320_김밥_1".to_string()));
    }

    #[tokio::test]
    async fn test_rekey_dry_run_is_a_no_op() {
        let store = InMemoryStore::new();
        store.insert("user_reports", "random", report("u1", "김밥", 1_700_000_000));
        let stats = rekey_reports(&store, true).await.unwrap();
        assert_eq!(stats.moved, 1);
        assert_eq!(store.keys("user_reports"), vec!["random".to_string()]);
    }

    #[test]
    fn test_food_key_part_sanitizes() {
        assert_eq!(food_key_part("비빔/밥"), "비빔·밥");
        assert_eq!(food_key_part("김   밥"), "김 밥");
        let long: String = "가".repeat(60);
        assert_eq!(food_key_part(&long).chars().count(), FOOD_PART_MAX_CHARS);
    }
}
