//! Header resolution: mapping a file's actual column names onto logical
//! schema slots.
//!
//! Resolution runs once per file (header shape is assumed stable across
//! all rows of one file): a reverse index of
//! `normalize_key(actual) → actual` is built from the first row's
//! columns, then each logical field scans its alias list in priority
//! order and takes the first hit. A field with no hit is unresolved and
//! reads as empty for every row of the file.
//!
//! Identical header sets always resolve identically.

use std::collections::HashMap;

use crate::csvio::SourceRow;
use crate::normalize::normalize_key;
use crate::schema::{EntityType, FieldSpec, ID_FIELD};

/// Logical-field → actual-column mapping for one source file.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    resolved: HashMap<&'static str, String>,
}

impl HeaderMap {
    /// Resolve an entity's fields (plus the explicit id column) against
    /// the columns of a file's first row.
    pub fn resolve(entity: EntityType, first_row: &SourceRow) -> HeaderMap {
        let mut index: HashMap<String, &str> = HashMap::new();
        for column in first_row.columns() {
            // First column wins if two normalize identically.
            index.entry(normalize_key(column)).or_insert(column);
        }

        let mut resolved = HashMap::new();
        for spec in entity.fields().iter().chain(std::iter::once(&ID_FIELD)) {
            if let Some(actual) = first_alias_hit(spec, &index) {
                resolved.insert(spec.name, actual.to_string());
            }
        }
        HeaderMap { resolved }
    }

    /// The actual column a logical field resolved to, if any.
    pub fn actual(&self, logical: &str) -> Option<&str> {
        self.resolved.get(logical).map(String::as_str)
    }

    /// Read a logical field's value from a row. Unresolved fields and
    /// missing cells read as the empty string.
    pub fn value<'r>(&self, row: &'r SourceRow, logical: &str) -> &'r str {
        self.actual(logical)
            .and_then(|column| row.get(column))
            .unwrap_or("")
    }
}

fn first_alias_hit<'i>(spec: &FieldSpec, index: &HashMap<String, &'i str>) -> Option<&'i str> {
    spec.aliases
        .iter()
        .find_map(|alias| index.get(&normalize_key(alias)).copied())
}
