//! Pure cell-value normalizers.
//!
//! Raw CSV cells arrive as heterogeneous strings (lists with mixed
//! delimiters, localized booleans, numbers with stray units, BOM-prefixed
//! headers). These functions convert them into canonical forms; everything
//! downstream (header resolution, projection, key derivation) builds on
//! them.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`strip_marker`] | Drop a leading BOM and surrounding whitespace |
//! | [`normalize_key`] | Comparison form for header/alias matching |
//! | [`to_list`] | Split multi-valued cells on any known delimiter |
//! | [`to_bool`] | Truthy-token match (incl. localized tokens) |
//! | [`to_number`] | Lenient numeric parse with explicit absence |
//! | [`slugify`] | Store-safe fallback identifier from free text |

use std::sync::OnceLock;

use regex::Regex;

/// Delimiters recognized inside multi-valued cells: semicolon, pipe, comma
/// (ASCII and full-width), ideographic comma, slash, middle dot, bullets.
const LIST_DELIMITERS: &[char] = &[';', '|', ',', '，', '、', '；', '/', '·', '•', '∙'];

/// Tokens treated as `true` by [`to_bool`], compared case-insensitively.
/// There is no explicit false set: anything else is false.
const TRUTHY_TOKENS: &[&str] = &["true", "1", "y", "yes", "t", "예", "참"];

/// Strip a leading byte-order marker and surrounding whitespace.
///
/// Identity on strings without either. This is the first step of every
/// other normalizer, since BOMs leak into the first header cell of
/// UTF-8 CSV exports.
pub fn strip_marker(s: &str) -> &str {
    s.trim_start_matches('\u{feff}').trim()
}

/// Normalization-insensitive comparison form for header names and aliases.
///
/// Removes internal whitespace and the punctuation set `. _ - /` after
/// [`strip_marker`]. Used only for alias/header matching, never for
/// display values.
pub fn normalize_key(s: &str) -> String {
    strip_marker(s)
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '_' | '-' | '/'))
        .collect()
}

/// Split a raw cell into an ordered list of trimmed, non-empty pieces.
///
/// Splits on any of [`LIST_DELIMITERS`]. De-duplication is left to the
/// caller so that first-seen order can be preserved where set semantics
/// are required.
pub fn to_list(s: &str) -> Vec<String> {
    strip_marker(s)
        .split(LIST_DELIMITERS)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a cell as a boolean via the truthy token set.
pub fn to_bool(s: &str) -> bool {
    let token = s.trim().to_lowercase();
    TRUTHY_TOKENS.contains(&token.as_str())
}

/// Parse a cell as a number, tolerating units and thousand separators.
///
/// Every character that is not a digit, dot, or minus sign is stripped
/// before parsing. An empty or unparseable remainder yields `None`,
/// never zero, so absent scores stay distinguishable from real zeros.
pub fn to_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn slug_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Word characters plus the Hangul syllable block survive; every other
    // run collapses to a single hyphen.
    RE.get_or_init(|| Regex::new(r"[^0-9a-z_가-힣]+").unwrap())
}

/// Derive a store-safe slug from free text.
///
/// Lowercases, strips the BOM, replaces runs outside `[0-9a-z_가-힣]`
/// with a single hyphen, and trims leading/trailing hyphens. Used only
/// when no explicit identifier column is available.
pub fn slugify(s: &str) -> String {
    let lowered = strip_marker(s).to_lowercase();
    slug_pattern()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}
