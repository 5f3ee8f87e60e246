//! CSV source loading.
//!
//! Reads a UTF-8 CSV file (first row = header) into [`SourceRow`]s. Header
//! names and cell values are BOM-stripped and trimmed here, once, so the
//! rest of the engine never sees a `\u{feff}` or stray edge whitespace.

use std::path::Path;

use anyhow::{Context, Result};

use crate::normalize::strip_marker;

/// One data row: ordered `(column, cell)` pairs as they appeared in the
/// file. Transient; consumed by the projector immediately after load.
#[derive(Debug, Clone)]
pub struct SourceRow {
    cols: Vec<(String, String)>,
}

impl SourceRow {
    pub fn new(cols: Vec<(String, String)>) -> Self {
        Self { cols }
    }

    /// The cell under an exact column name, if the column exists.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cols
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Column names in file order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cols.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cols.iter().all(|(_, value)| value.is_empty())
    }
}

/// Load every data row of a CSV file.
///
/// The header row is consumed to name the columns; rows shorter than the
/// header are padded with empty cells (ragged exports are common in
/// hand-maintained sheets).
pub fn load_rows(path: &Path) -> Result<Vec<SourceRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .iter()
        .map(|h| strip_marker(h).to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("Failed to read CSV row: {}", path.display()))?;
        let cols = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cell = record.get(i).map(strip_marker).unwrap_or_default();
                (name.clone(), cell.to_string())
            })
            .collect();
        rows.push(SourceRow::new(cols));
    }
    Ok(rows)
}
