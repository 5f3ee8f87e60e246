//! Document-key derivation and collision tracking.
//!
//! The default key for a row is its canonical display name made
//! store-safe. The target store forbids exactly one character in keys:
//! the forward slash, which it treats as a path separator. Only that
//! character is substituted, with the visually similar full-width solidus.
//! Everything else is preserved: keys stay human-readable, and the
//! unmodified display name is stored separately as a field, so nothing is
//! lost.

use std::collections::HashMap;

/// Full-width solidus substituted for `/` in document keys.
pub const SLASH_SUBSTITUTE: char = '／'; // U+FF0F

/// Make a canonical name safe for use as a document key.
///
/// Replaces `/` with [`SLASH_SUBSTITUTE`] and changes nothing else.
pub fn safe_key(name: &str) -> String {
    name.replace('/', &SLASH_SUBSTITUTE.to_string())
}

/// Detects distinct raw names mapping onto the same safe key within one
/// reconciliation run.
///
/// Collisions are surfaced, not resolved: both rows proceed and the last
/// write wins at commit time.
#[derive(Debug, Default)]
pub struct KeyTracker {
    seen: HashMap<String, String>,
    collisions: u64,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a derived key. Returns the first-seen raw name when this
    /// key was already claimed by a *different* raw name (a collision);
    /// `None` otherwise.
    pub fn track(&mut self, safe: &str, raw_name: &str) -> Option<String> {
        match self.seen.get(safe) {
            Some(first) if first != raw_name => {
                self.collisions += 1;
                Some(first.clone())
            }
            Some(_) => None,
            None => {
                self.seen.insert(safe.to_string(), raw_name.to_string());
                None
            }
        }
    }

    pub fn collisions(&self) -> u64 {
        self.collisions
    }
}
