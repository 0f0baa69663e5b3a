// ============================================================
// Layer 3 - Canonical Document Schema
// ============================================================
// The single in-memory shape every format interpreter produces.
// By the time a ConfigDocument exists the JSON/TOML/YAML syntax
// is gone: an entry is a label plus the phrasings found for it,
// in document order.
//
// Malformed items are kept as markers rather than dropped here,
// so the Dataset Builder can decide (per its policy) whether to
// skip them with a warning or fail the run.

use serde::{Deserialize, Serialize};

use crate::domain::format::Format;

/// One item found under an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonicalItem {
    /// A phrasing string, exactly as written in the source.
    Text(String),
    /// Something that should have been a phrasing but isn't.
    Malformed(String),
}

/// One label grouping from the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    /// The label/category, if the source supplied a non-empty one
    pub label: Option<String>,

    /// Phrasings in document order
    pub items: Vec<CanonicalItem>,

    /// Zero-based position of the entry in the source document
    pub position: usize,
}

impl CanonicalEntry {
    pub fn new(label: Option<String>, items: Vec<CanonicalItem>, position: usize) -> Self {
        let label = label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        Self { label, items, position }
    }

    /// True when the entry has a label and at least one non-blank phrasing.
    pub fn is_usable(&self) -> bool {
        self.label.is_some()
            && self
                .items
                .iter()
                .any(|i| matches!(i, CanonicalItem::Text(t) if !t.trim().is_empty()))
    }
}

/// A parsed input document normalised into the canonical schema.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// The syntax the document was written in
    pub format: Format,

    /// Label groupings, in document order
    pub entries: Vec<CanonicalEntry>,
}

impl ConfigDocument {
    pub fn new(format: Format, entries: Vec<CanonicalEntry>) -> Self {
        Self { format, entries }
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for label in self.entries.iter().filter_map(|e| e.label.as_deref()) {
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        seen
    }
}
