// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The seams other layers implement:
//
//   DocumentInterpreter → one implementation per input format
//                         (JSON, TOML, YAML), selected by tagged
//                         dispatch on `Format`
//   Classifier          → anything that maps token ids to class
//                         probabilities (float model, int8 export)
//
// The application layer only talks to these traits, so a new
// format or a new runtime is one more `impl`.

use crate::domain::{document::ConfigDocument, format::Format};
use crate::error::Result;

// ─── DocumentInterpreter ──────────────────────────────────────────────────────
/// Turns raw document text into the canonical schema.
///
/// Implementations only differ in `parse`; the canonical conversion
/// and validation are shared so all formats normalise identically.
pub trait DocumentInterpreter {
    /// The format this interpreter reads.
    fn format(&self) -> Format;

    /// Parse raw text into a format-neutral tree.
    fn parse(&self, raw: &str) -> Result<serde_json::Value>;

    /// Convert a parsed tree into the canonical schema.
    fn to_canonical(&self, tree: serde_json::Value) -> Result<ConfigDocument>;

    /// Check the canonical document carries usable training data.
    fn validate(&self, document: &ConfigDocument) -> Result<()>;

    /// parse → to_canonical → validate.
    fn interpret(&self, raw: &str) -> Result<ConfigDocument> {
        let tree = self.parse(raw)?;
        let document = self.to_canonical(tree)?;
        self.validate(&document)?;
        Ok(document)
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────
/// Any runtime that scores a padded token-id sequence.
pub trait Classifier {
    /// Number of classes in the output distribution.
    fn num_classes(&self) -> usize;

    /// Sequence length the runtime expects.
    fn max_len(&self) -> usize;

    /// Class probabilities for one padded sequence of `max_len` ids.
    fn predict_proba(&self, token_ids: &[u32]) -> Result<Vec<f32>>;
}
