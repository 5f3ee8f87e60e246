//! Reconciliation driver.
//!
//! Orchestrates the full flow for one entity: load source rows → resolve
//! headers → project documents → batch-write under the provider limit →
//! optionally prune documents whose key the run did not produce →
//! optionally strip fields outside the entity's allow-list. Running the
//! same input twice yields the same end state: keys are stable, writes
//! are upserts, and prune only ever removes what the current keep-set
//! does not cover.
//!
//! Batch commits are sequential and fail-fast: a failed group aborts the
//! run with no retry. The recovery path is re-running the sync, which is
//! safe by idempotence.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};

use crate::backup;
use crate::config::Config;
use crate::csvio;
use crate::project::{self, CanonicalDocument};
use crate::schema::EntityType;
use crate::store::{DocumentStore, WriteMode, WriteOp};

/// Flags controlling a reconciliation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Log intended actions without mutating the store.
    pub dry_run: bool,
    /// Delete documents whose key is absent from the keep-set.
    pub prune: bool,
    /// Strip stored fields outside the entity's allow-list.
    pub strict: bool,
}

/// Counters surfaced at run completion. Tests assert on these rather
/// than scraping per-row warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub rows_read: u64,
    pub docs_written: u64,
    pub rows_skipped: u64,
    pub collisions: u64,
    pub unresolved_fields: u64,
    pub batches: u64,
    pub pruned: u64,
    pub fields_stripped: u64,
}

/// Reconcile already-loaded rows against an entity's collection.
///
/// `mode` selects merge-upsert (`sync`) or full replacement (`reset`).
/// This is the library entry point the CLI commands and the test suite
/// share; file loading and backups live with the callers.
pub async fn reconcile_rows(
    store: &dyn DocumentStore,
    entity: EntityType,
    rows: &[csvio::SourceRow],
    mode: WriteMode,
    batch_size: usize,
    opts: &ReconcileOptions,
) -> Result<RunStats> {
    let collection = entity.collection();
    let projection = project::project(entity, rows);

    let mut stats = RunStats {
        rows_read: rows.len() as u64,
        rows_skipped: projection.skipped_rows,
        collisions: projection.collisions,
        unresolved_fields: projection.unresolved_fields,
        ..RunStats::default()
    };

    let keep: HashSet<String> = projection.docs.iter().map(|d| d.key.clone()).collect();

    // BATCH_WRITING
    if opts.dry_run {
        for doc in &projection.docs {
            println!("[DRY] write {} {}", collection, doc.key);
        }
        for (key, path) in &projection.field_deletes {
            println!("[DRY] delete-field {} {} '{}'", collection, key, path);
        }
        stats.docs_written = projection.docs.len() as u64;
    } else {
        let writes: Vec<WriteOp> = projection
            .docs
            .iter()
            .map(|doc: &CanonicalDocument| WriteOp {
                key: doc.key.clone(),
                fields: doc.fields.clone(),
                mode,
            })
            .collect();
        let total = writes.len();
        let mut committed = 0usize;
        for group in writes.chunks(batch_size) {
            store
                .batch_write(collection, group)
                .await
                .with_context(|| format!("Batch commit failed for {}", collection))?;
            committed += group.len();
            stats.batches += 1;
            println!("  batch {}/{} committed", committed, total);
        }
        stats.docs_written = total as u64;

        for (key, path) in &projection.field_deletes {
            store.delete_field(collection, key, path).await?;
        }
    }

    // PRUNING
    if opts.prune {
        let existing = store.list(collection).await?;
        let stale: Vec<String> = existing
            .iter()
            .map(|(key, _)| key.clone())
            .filter(|key| !keep.contains(key))
            .collect();
        if opts.dry_run {
            for key in &stale {
                println!("[DRY] prune {} {}", collection, key);
            }
        } else {
            for group in stale.chunks(batch_size) {
                store.batch_delete(collection, group).await?;
            }
        }
        stats.pruned = stale.len() as u64;
    }

    // FIELD_STRIPPING
    if opts.strict {
        let allowed: HashSet<&str> = entity.allowed_fields().iter().copied().collect();
        let existing = store.list(collection).await?;
        for (key, fields) in &existing {
            for field in fields.keys() {
                if allowed.contains(field.as_str()) {
                    continue;
                }
                if opts.dry_run {
                    println!("[DRY] strip {} {} field '{}'", collection, key, field);
                } else {
                    store.delete_field(collection, key, field).await?;
                }
                stats.fields_stripped += 1;
            }
        }
    }

    Ok(stats)
}

/// Merge-upsert sync for a set of entities.
///
/// Each entity is independent: a missing source file skips that entity
/// with a notice and does not abort its siblings. Unreadable files and
/// failed batch commits are fatal.
pub async fn run_sync(
    config: &Config,
    store: &dyn DocumentStore,
    entities: &[EntityType],
    opts: &ReconcileOptions,
) -> Result<()> {
    for &entity in entities {
        let path = config.csv_path(entity);
        if !path.exists() {
            println!("[SKIP] {}: {} not found", entity.slug(), path.display());
            continue;
        }
        let rows = csvio::load_rows(&path)?;

        println!("sync {}{}", entity.slug(), if opts.dry_run { " (dry-run)" } else { "" });
        let stats = reconcile_rows(
            store,
            entity,
            &rows,
            WriteMode::Merge,
            config.sync.batch_size,
            opts,
        )
        .await?;
        print_stats(&stats, opts);
    }
    println!("ok");
    Ok(())
}

/// All-or-nothing reset of one entity's collection.
///
/// The source file is the sole input: zero rows aborts before anything
/// is touched. The existing collection is snapshotted to a backup file
/// first; only then are full-replace writes committed. `--prune` removes
/// documents the file no longer covers.
pub async fn run_reset(
    config: &Config,
    store: &dyn DocumentStore,
    entity: EntityType,
    opts: &ReconcileOptions,
) -> Result<()> {
    let path = config.csv_path(entity);
    let rows = csvio::load_rows(&path)?;
    if rows.is_empty() {
        bail!("{} has no rows; refusing to reset {}", path.display(), entity.slug());
    }

    println!("reset {}{}", entity.slug(), if opts.dry_run { " (dry-run)" } else { "" });

    if opts.dry_run {
        println!("[DRY] would back up {}", entity.collection());
    } else {
        let backup_path =
            backup::backup_collection(store, entity.collection(), &config.backup.dir).await?;
        println!("  backup written: {}", backup_path.display());
    }

    let stats = reconcile_rows(
        store,
        entity,
        &rows,
        WriteMode::Replace,
        config.sync.batch_size,
        opts,
    )
    .await?;
    print_stats(&stats, opts);
    println!("ok");
    Ok(())
}

fn print_stats(stats: &RunStats, opts: &ReconcileOptions) {
    println!("  rows read: {}", stats.rows_read);
    println!("  documents written: {}", stats.docs_written);
    println!("  rows skipped: {}", stats.rows_skipped);
    println!("  key collisions: {}", stats.collisions);
    println!("  unresolved fields: {}", stats.unresolved_fields);
    if opts.prune {
        println!("  pruned: {}", stats.pruned);
    }
    if opts.strict {
        println!("  fields stripped: {}", stats.fields_stripped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csvio::SourceRow;
    use crate::store::memory::InMemoryStore;
    use crate::store::{FieldMap, Value};

    fn row(cols: &[(&str, &str)]) -> SourceRow {
        SourceRow::new(
            cols.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn allergen_row(name: &str) -> SourceRow {
        row(&[("표준명", name), ("동의어", ""), ("주요알레르겐", "")])
    }

    #[tokio::test]
    async fn test_batching_under_limit() {
        let store = InMemoryStore::new();
        let rows: Vec<SourceRow> = (0..7).map(|i| allergen_row(&format!("a{}", i))).collect();
        let stats = reconcile_rows(
            &store,
            EntityType::Allergen,
            &rows,
            WriteMode::Merge,
            3,
            &ReconcileOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(stats.docs_written, 7);
        assert_eq!(stats.batches, 3); // 3 + 3 + 1
        assert_eq!(store.keys("allergens").len(), 7);
    }

    #[tokio::test]
    async fn test_unresolved_field_count_surfaces_in_stats() {
        let store = InMemoryStore::new();
        // Name and synonyms resolve; category, symptom, score, and
        // is_major have no column.
        let rows = vec![row(&[("표준명", "계란"), ("동의어", "달걀")])];
        let stats = reconcile_rows(
            &store,
            EntityType::Allergen,
            &rows,
            WriteMode::Merge,
            450,
            &ReconcileOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(stats.unresolved_fields, 4);
    }

    #[tokio::test]
    async fn test_dry_run_mutates_nothing() {
        let store = InMemoryStore::new();
        store.insert("allergens", "stale", FieldMap::new());
        let rows = vec![allergen_row("계란")];
        let opts = ReconcileOptions {
            dry_run: true,
            prune: true,
            strict: true,
        };
        let stats = reconcile_rows(
            &store,
            EntityType::Allergen,
            &rows,
            WriteMode::Merge,
            450,
            &opts,
        )
        .await
        .unwrap();
        // Intended actions are still counted…
        assert_eq!(stats.docs_written, 1);
        assert_eq!(stats.pruned, 1);
        // …but the store is untouched.
        assert_eq!(store.keys("allergens"), vec!["stale".to_string()]);
    }

    #[tokio::test]
    async fn test_prune_removes_exactly_out_of_set_keys() {
        let store = InMemoryStore::new();
        for key in ["A", "B", "C"] {
            store.insert("allergens", key, FieldMap::new());
        }
        let rows = vec![allergen_row("A"), allergen_row("C")];
        let opts = ReconcileOptions {
            prune: true,
            ..Default::default()
        };
        let stats = reconcile_rows(
            &store,
            EntityType::Allergen,
            &rows,
            WriteMode::Merge,
            450,
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(stats.pruned, 1);
        assert_eq!(store.keys("allergens"), vec!["A".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn test_without_prune_stale_documents_survive() {
        let store = InMemoryStore::new();
        for key in ["A", "B"] {
            store.insert("allergens", key, FieldMap::new());
        }
        let rows = vec![allergen_row("A")];
        reconcile_rows(
            &store,
            EntityType::Allergen,
            &rows,
            WriteMode::Merge,
            450,
            &ReconcileOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(store.keys("allergens"), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_strict_strips_only_unknown_fields() {
        let store = InMemoryStore::new();
        let mut fields = FieldMap::new();
        fields.insert("display_name".into(), Value::text("계란"));
        fields.insert("legacy_field".into(), Value::text("old"));
        store.insert("allergens", "계란", fields);

        let rows = vec![allergen_row("계란")];
        let opts = ReconcileOptions {
            strict: true,
            ..Default::default()
        };
        let stats = reconcile_rows(
            &store,
            EntityType::Allergen,
            &rows,
            WriteMode::Merge,
            450,
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(stats.fields_stripped, 1);
        let doc = store.get("allergens", "계란").unwrap();
        assert!(!doc.contains_key("legacy_field"));
        assert!(doc.contains_key("display_name"));
        assert!(doc.contains_key("synonyms"));
    }

    #[tokio::test]
    async fn test_idempotent_double_run() {
        let store = InMemoryStore::new();
        let rows = vec![allergen_row("계란"), allergen_row("우유")];
        let opts = ReconcileOptions {
            prune: true,
            ..Default::default()
        };
        for _ in 0..2 {
            reconcile_rows(
                &store,
                EntityType::Allergen,
                &rows,
                WriteMode::Merge,
                450,
                &opts,
            )
            .await
            .unwrap();
        }
        let keys = store.keys("allergens");
        assert_eq!(keys, vec!["계란".to_string(), "우유".to_string()]);
        // Same field values modulo the server timestamp.
        let doc = store.get("allergens", "계란").unwrap();
        assert_eq!(doc.get("display_name"), Some(&Value::text("계란")));
    }

    #[tokio::test]
    async fn test_risk_rule_legacy_fields_removed() {
        let store = InMemoryStore::new();
        let mut legacy_cond = FieldMap::new();
        legacy_cond.insert("allergens_any".into(), Value::text_list(vec!["우유".into()]));
        let mut fields = FieldMap::new();
        fields.insert("conditions".into(), Value::Map(legacy_cond));
        store.insert("risk_rules", "high", fields);

        let rows = vec![row(&[
            ("위험도", "High"),
            ("구분", "전신"),
            ("한글 키워드(정규식)", "아나필락시스"),
        ])];
        reconcile_rows(
            &store,
            EntityType::RiskRule,
            &rows,
            WriteMode::Merge,
            450,
            &ReconcileOptions::default(),
        )
        .await
        .unwrap();

        let doc = store.get("risk_rules", "high").unwrap();
        match doc.get("conditions") {
            Some(Value::Map(cond)) => {
                assert!(cond.contains_key("keyword_rules"));
                assert!(!cond.contains_key("allergens_any"));
            }
            other => panic!("unexpected conditions: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dry_run_defers_legacy_field_deletes() {
        let store = InMemoryStore::new();
        let mut legacy_cond = FieldMap::new();
        legacy_cond.insert("allergens_any".into(), Value::text_list(vec!["우유".into()]));
        let mut fields = FieldMap::new();
        fields.insert("conditions".into(), Value::Map(legacy_cond));
        store.insert("risk_rules", "high", fields);

        let rows = vec![row(&[
            ("위험도", "High"),
            ("구분", "전신"),
            ("한글 키워드(정규식)", "아나필락시스"),
        ])];
        let opts = ReconcileOptions {
            dry_run: true,
            ..Default::default()
        };
        reconcile_rows(&store, EntityType::RiskRule, &rows, WriteMode::Merge, 450, &opts)
            .await
            .unwrap();

        // The scheduled delete is only announced; the stored legacy
        // field survives the dry run.
        let doc = store.get("risk_rules", "high").unwrap();
        match doc.get("conditions") {
            Some(Value::Map(cond)) => assert!(cond.contains_key("allergens_any")),
            other => panic!("unexpected conditions: {:?}", other),
        }
    }
}
