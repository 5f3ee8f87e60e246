//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Documents are rows of one `documents` table keyed by
//! `(collection, key)`, with the field map serialized as JSON. Each
//! batch commits inside a single transaction, which gives the
//! group-level atomicity the reconciliation driver relies on.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{
    apply_write, fields_from_json, fields_to_json, remove_field_path, DocumentStore, FieldMap,
    WriteOp,
};

/// Document store persisted in a local SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the store at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create the schema. Idempotent.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                fields_json TEXT NOT NULL DEFAULT '{}',
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn fetch_fields(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection: &str,
    key: &str,
) -> Result<Option<FieldMap>> {
    let row: Option<String> =
        sqlx::query_scalar("SELECT fields_json FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await?;

    match row {
        Some(json) => {
            let parsed: serde_json::Value = serde_json::from_str(&json).with_context(|| {
                format!("Corrupt fields_json for document {}/{}", collection, key)
            })?;
            Ok(Some(fields_from_json(&parsed)))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list(&self, collection: &str) -> Result<Vec<(String, FieldMap)>> {
        let rows = sqlx::query(
            "SELECT key, fields_json FROM documents WHERE collection = ? ORDER BY key",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("key");
            let json: String = row.get("fields_json");
            let parsed: serde_json::Value = serde_json::from_str(&json).with_context(|| {
                format!("Corrupt fields_json for document {}/{}", collection, key)
            })?;
            docs.push((key, fields_from_json(&parsed)));
        }
        Ok(docs)
    }

    async fn batch_write(&self, collection: &str, writes: &[WriteOp]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for op in writes {
            let existing = fetch_fields(&mut tx, collection, &op.key).await?;
            let resolved = apply_write(existing, op, now);
            let json = serde_json::to_string(&fields_to_json(&resolved)?)?;
            sqlx::query(
                r#"
                INSERT INTO documents (collection, key, fields_json, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(collection, key) DO UPDATE SET
                    fields_json = excluded.fields_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&op.key)
            .bind(&json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn batch_delete(&self, collection: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
                .bind(collection)
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_field(&self, collection: &str, key: &str, field_path: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        if let Some(mut fields) = fetch_fields(&mut tx, collection, key).await? {
            if remove_field_path(&mut fields, field_path) {
                let json = serde_json::to_string(&fields_to_json(&fields)?)?;
                sqlx::query(
                    "UPDATE documents SET fields_json = ?, updated_at = ? WHERE collection = ? AND key = ?",
                )
                .bind(&json)
                .bind(now)
                .bind(collection)
                .bind(key)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
