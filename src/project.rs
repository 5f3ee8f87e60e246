//! Row projection: turning source rows into canonical documents.
//!
//! One [`CanonicalDocument`] per valid row, except risk rules, which
//! group rows by severity tier into one document per tier. Fields the
//! source does not provide (unresolved header, empty cell) are emitted
//! as explicit empty values of the right type (empty string, empty
//! list, `Null`, `false`), never omitted, so a merge-upsert against a
//! document with a stale shape still converges. The two optional note
//! fields on symptom weights are the exception: they emit the `Delete`
//! sentinel when empty rather than polluting documents with empty
//! strings.

use std::collections::HashSet;

use uuid::Uuid;

use crate::csvio::SourceRow;
use crate::ident::{safe_key, KeyTracker};
use crate::normalize::{slugify, to_bool, to_list, to_number};
use crate::resolve::HeaderMap;
use crate::schema::EntityType;
use crate::store::{FieldMap, Value};

/// A normalized document ready for upsert.
#[derive(Debug, Clone)]
pub struct CanonicalDocument {
    pub key: String,
    pub fields: FieldMap,
}

/// Dotted field paths to delete after writing a document (legacy shape
/// cleanup; currently only risk-rule tiers carry these).
pub type FieldDelete = (String, &'static str);

/// Result of projecting one file's rows.
#[derive(Debug, Default)]
pub struct Projection {
    pub docs: Vec<CanonicalDocument>,
    pub field_deletes: Vec<FieldDelete>,
    /// Rows dropped for a missing canonical name.
    pub skipped_rows: u64,
    /// Distinct raw names that derived an already-claimed key.
    pub collisions: u64,
    /// Logical fields no source column resolved to.
    pub unresolved_fields: u64,
}

/// Project all rows of one entity's source file.
///
/// Header resolution happens once, against the first row. Fully empty
/// rows (trailing blank lines in hand-edited files) are ignored without
/// a warning.
pub fn project(entity: EntityType, rows: &[SourceRow]) -> Projection {
    let Some(first) = rows.first() else {
        return Projection::default();
    };
    let headers = HeaderMap::resolve(entity, first);
    let mut unresolved = 0u64;
    for spec in entity.fields() {
        if headers.actual(spec.name).is_none() {
            eprintln!(
                "[WARN] {}: no source column for '{}'",
                entity.slug(),
                spec.name
            );
            unresolved += 1;
        }
    }
    let rows: Vec<&SourceRow> = rows.iter().filter(|r| !r.is_empty()).collect();

    let mut out = match entity {
        EntityType::RiskRule => project_risk_rules(&headers, &rows),
        _ => project_per_row(entity, &headers, &rows),
    };
    out.unresolved_fields = unresolved;
    out
}

fn project_per_row(
    entity: EntityType,
    headers: &HeaderMap,
    rows: &[&SourceRow],
) -> Projection {
    let mut out = Projection::default();
    let mut tracker = KeyTracker::new();

    for (idx, row) in rows.iter().enumerate() {
        let doc = match entity {
            EntityType::Allergen => project_allergen(headers, row),
            EntityType::SymptomWeight => project_symptom_weight(headers, row),
            EntityType::UserSeed => project_user_seed(headers, row),
            EntityType::UserReport => Some(project_user_report(headers, row)),
            EntityType::RiskRule => unreachable!("risk rules project per tier"),
        };

        let Some((raw_name, doc)) = doc else {
            eprintln!(
                "[WARN] {}: row {} has no canonical name, skipped",
                entity.slug(),
                idx + 1
            );
            out.skipped_rows += 1;
            continue;
        };

        if let Some(first_seen) = tracker.track(&doc.key, &raw_name) {
            eprintln!(
                "[WARN] {}: key collision: \"{}\" vs \"{}\" -> \"{}\" (last write wins)",
                entity.slug(),
                first_seen,
                raw_name,
                doc.key
            );
        }
        out.docs.push(doc);
    }

    out.collisions = tracker.collisions();
    out
}

fn project_allergen(headers: &HeaderMap, row: &SourceRow) -> Option<(String, CanonicalDocument)> {
    let name = headers.value(row, "display_name");
    if name.is_empty() {
        return None;
    }

    let mut fields = FieldMap::new();
    // The display name keeps the raw string exactly; only the key is
    // store-safety-transformed.
    fields.insert("display_name".into(), Value::text(name));
    fields.insert("name".into(), Value::text(name));
    fields.insert("category".into(), Value::text(headers.value(row, "category")));
    fields.insert("symptom".into(), Value::text(headers.value(row, "symptom")));
    fields.insert(
        "conservative_score".into(),
        number_or_null(headers.value(row, "conservative_score")),
    );
    fields.insert(
        "synonyms".into(),
        Value::text_list(dedup(to_list(headers.value(row, "synonyms")))),
    );
    fields.insert(
        "is_major".into(),
        Value::Bool(to_bool(headers.value(row, "is_major"))),
    );
    fields.insert("updated_at".into(), Value::ServerTimestamp);

    let key = explicit_or(headers, row, || safe_key(name));
    Some((name.to_string(), CanonicalDocument { key, fields }))
}

fn project_symptom_weight(
    headers: &HeaderMap,
    row: &SourceRow,
) -> Option<(String, CanonicalDocument)> {
    let name = headers.value(row, "name");
    if name.is_empty() {
        return None;
    }

    let mut fields = FieldMap::new();
    fields.insert("name".into(), Value::text(name));
    fields.insert(
        "symptoms".into(),
        Value::text_list(dedup(to_list(headers.value(row, "symptoms")))),
    );
    fields.insert(
        "base_score".into(),
        number_or_null(headers.value(row, "base_score")),
    );
    // Optional annotations: delete-when-empty rather than empty-string.
    fields.insert(
        "rule_note".into(),
        text_or_delete(headers.value(row, "rule_note")),
    );
    fields.insert("note".into(), text_or_delete(headers.value(row, "note")));
    fields.insert("updated_at".into(), Value::ServerTimestamp);

    let key = explicit_or(headers, row, || safe_key(name));
    Some((name.to_string(), CanonicalDocument { key, fields }))
}

fn project_user_seed(headers: &HeaderMap, row: &SourceRow) -> Option<(String, CanonicalDocument)> {
    let nickname = headers.value(row, "nickname");
    if nickname.is_empty() {
        return None;
    }

    let mut fields = FieldMap::new();
    fields.insert("nickname".into(), Value::text(nickname));
    fields.insert(
        "allergens".into(),
        Value::text_list(dedup(to_list(headers.value(row, "allergens")))),
    );
    fields.insert("created_at".into(), Value::ServerTimestamp);
    fields.insert("updated_at".into(), Value::ServerTimestamp);

    let key = explicit_or(headers, row, || slugify(nickname));
    Some((nickname.to_string(), CanonicalDocument { key, fields }))
}

fn project_user_report(headers: &HeaderMap, row: &SourceRow) -> (String, CanonicalDocument) {
    let mut fields = FieldMap::new();
    fields.insert("uid".into(), Value::text(headers.value(row, "uid")));
    fields.insert("food".into(), Value::text(headers.value(row, "food")));
    fields.insert(
        "allergens_detected".into(),
        Value::text_list(dedup(to_list(headers.value(row, "allergens_detected")))),
    );
    fields.insert(
        "symptoms_checked".into(),
        Value::text_list(dedup(to_list(headers.value(row, "symptoms_checked")))),
    );
    fields.insert(
        "total_score".into(),
        number_or_null(headers.value(row, "total_score")),
    );
    fields.insert(
        "final_severity".into(),
        Value::text(headers.value(row, "final_severity")),
    );
    fields.insert("created_at".into(), Value::ServerTimestamp);
    fields.insert("updated_at".into(), Value::ServerTimestamp);

    // Reports have no natural name: explicit id wins, otherwise a fresh
    // UUID (rekeying to stable ids is a separate pass).
    let key = explicit_or(headers, row, || Uuid::new_v4().to_string());
    (key.clone(), CanonicalDocument { key, fields })
}

/// Legacy nested condition fields removed whenever a tier is rewritten.
const LEGACY_RULE_PATHS: [&str; 2] = ["conditions.allergens_any", "conditions.symptoms_any"];

fn project_risk_rules(headers: &HeaderMap, rows: &[&SourceRow]) -> Projection {
    let mut out = Projection::default();
    // Severity tiers in first-seen order.
    let mut tiers: Vec<(String, Vec<Value>)> = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let severity = headers.value(row, "severity").to_lowercase();
        if severity.is_empty() {
            eprintln!(
                "[WARN] risk-rules: row {} has no severity, skipped",
                idx + 1
            );
            out.skipped_rows += 1;
            continue;
        }

        let kind = headers.value(row, "rule_kind");
        let pattern = headers.value(row, "keyword_pattern");
        if kind.is_empty() && pattern.is_empty() {
            continue;
        }

        let mut rule = FieldMap::new();
        rule.insert("kind".into(), Value::text(kind));
        rule.insert("pattern".into(), Value::text(pattern));

        match tiers.iter_mut().find(|(tier, _)| tier == &severity) {
            Some((_, rules)) => rules.push(Value::Map(rule)),
            None => tiers.push((severity, vec![Value::Map(rule)])),
        }
    }

    for (severity, rules) in tiers {
        let mut conditions = FieldMap::new();
        conditions.insert("keyword_rules".into(), Value::List(rules));

        let mut fields = FieldMap::new();
        fields.insert("severity".into(), Value::text(title_case(&severity)));
        fields.insert("conditions".into(), Value::Map(conditions));
        fields.insert("updated_at".into(), Value::ServerTimestamp);

        let key = safe_key(&severity);
        for path in LEGACY_RULE_PATHS {
            out.field_deletes.push((key.clone(), path));
        }
        out.docs.push(CanonicalDocument { key, fields });
    }

    out
}

fn explicit_or(headers: &HeaderMap, row: &SourceRow, derive: impl FnOnce() -> String) -> String {
    let explicit = headers.value(row, "id");
    if explicit.is_empty() {
        derive()
    } else {
        explicit.to_string()
    }
}

fn number_or_null(cell: &str) -> Value {
    match to_number(cell) {
        Some(n) => Value::Number(n),
        None => Value::Null,
    }
}

fn text_or_delete(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Delete
    } else {
        Value::text(cell)
    }
}

/// De-duplicate preserving first-seen order.
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
