//! Storage abstraction for seedsync.
//!
//! The [`DocumentStore`] trait defines the batch-write/read/delete surface
//! the reconciliation engine needs, enabling pluggable backends (SQLite,
//! in-memory). The store is always an explicitly constructed value passed
//! into the driver, never process-global state, so tests can substitute
//! the in-memory implementation.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;

/// A document field value.
///
/// `ServerTimestamp` and `Delete` are write-time sentinels: backends
/// resolve the former to the commit wall-clock time and apply the latter
/// by removing the field. Neither is ever persisted or returned by
/// [`DocumentStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    /// Explicit numeric absence. Distinct from a missing field so that a
    /// merge-upsert can overwrite a stale number with "no value".
    Null,
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A resolved server-assigned timestamp (epoch seconds).
    Timestamp(i64),
    /// Write-time sentinel: resolve to the commit time.
    ServerTimestamp,
    /// Write-time sentinel: remove this field under merge.
    Delete,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// Wrap a list of strings as a `List` of `Text` values.
    pub fn text_list(items: Vec<String>) -> Value {
        Value::List(items.into_iter().map(Value::Text).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// Field name → value map making up one document.
pub type FieldMap = BTreeMap<String, Value>;

/// How a write applies against an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Partial update: listed fields overwrite, unlisted fields survive,
    /// `Delete` sentinels remove.
    Merge,
    /// Full replacement: the document afterwards has exactly the listed
    /// fields (minus `Delete` entries).
    Replace,
}

/// A single batched write operation.
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub key: String,
    pub fields: FieldMap,
    pub mode: WriteMode,
}

/// Abstract document store consumed by the reconciliation engine.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list`](DocumentStore::list) | All `(key, fields)` pairs of a collection |
/// | [`batch_write`](DocumentStore::batch_write) | Commit a group of upserts atomically |
/// | [`batch_delete`](DocumentStore::batch_delete) | Delete a group of keys |
/// | [`delete_field`](DocumentStore::delete_field) | Remove one (possibly nested) field |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every document of a collection as `(key, fields)` pairs.
    async fn list(&self, collection: &str) -> Result<Vec<(String, FieldMap)>>;

    /// Commit a group of writes as one atomic unit.
    ///
    /// Sentinel values are resolved at commit time; all writes in the
    /// group observe the same server timestamp.
    async fn batch_write(&self, collection: &str, writes: &[WriteOp]) -> Result<()>;

    /// Delete every listed key. Missing keys are ignored.
    async fn batch_delete(&self, collection: &str, keys: &[String]) -> Result<()>;

    /// Remove a single field from one document.
    ///
    /// `field_path` may be dotted (`conditions.allergens_any`) to reach
    /// into nested `Map` values. A missing document or field is a no-op.
    async fn delete_field(&self, collection: &str, key: &str, field_path: &str) -> Result<()>;
}

/// Apply one write to an existing (possibly absent) field map.
///
/// Shared by backends so merge/replace and sentinel semantics cannot
/// drift between them.
pub(crate) fn apply_write(existing: Option<FieldMap>, op: &WriteOp, now: i64) -> FieldMap {
    let mut target = match op.mode {
        WriteMode::Merge => existing.unwrap_or_default(),
        WriteMode::Replace => FieldMap::new(),
    };
    for (name, value) in &op.fields {
        match value {
            Value::Delete => {
                target.remove(name);
            }
            Value::ServerTimestamp => {
                target.insert(name.clone(), Value::Timestamp(now));
            }
            other => {
                target.insert(name.clone(), other.clone());
            }
        }
    }
    target
}

/// Remove a dotted field path from a field map. Returns whether anything
/// was removed.
pub(crate) fn remove_field_path(fields: &mut FieldMap, path: &str) -> bool {
    match path.split_once('.') {
        None => fields.remove(path).is_some(),
        Some((head, rest)) => match fields.get_mut(head) {
            Some(Value::Map(inner)) => remove_field_path(inner, rest),
            _ => false,
        },
    }
}

/// Encode a resolved [`Value`] as JSON (backup files, SQLite column).
///
/// Timestamps use the `{"$timestamp": <secs>}` envelope so they survive
/// a round-trip without being mistaken for plain numbers.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(value_to_json).collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(entries) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in entries {
                obj.insert(k.clone(), value_to_json(v)?);
            }
            serde_json::Value::Object(obj)
        }
        Value::Timestamp(t) => serde_json::json!({ "$timestamp": t }),
        Value::ServerTimestamp | Value::Delete => {
            bail!("write sentinel cannot be serialized; resolve it first")
        }
    })
}

/// Decode a JSON value produced by [`value_to_json`].
pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::List(items.iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some(serde_json::Value::Number(n)) = obj.get("$timestamp") {
                    if let Some(t) = n.as_i64() {
                        return Value::Timestamp(t);
                    }
                }
            }
            Value::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), value_from_json(v)))
                    .collect(),
            )
        }
    }
}

/// Encode a whole field map as a JSON object.
pub fn fields_to_json(fields: &FieldMap) -> Result<serde_json::Value> {
    let mut obj = serde_json::Map::new();
    for (name, value) in fields {
        obj.insert(name.clone(), value_to_json(value)?);
    }
    Ok(serde_json::Value::Object(obj))
}

/// Decode a JSON object back into a field map. Non-objects decode empty.
pub fn fields_from_json(json: &serde_json::Value) -> FieldMap {
    match json {
        serde_json::Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| (k.clone(), value_from_json(v)))
            .collect(),
        _ => FieldMap::new(),
    }
}
