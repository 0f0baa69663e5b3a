// ============================================================
// Layer 4 - Text Preprocessor
// ============================================================
// The one text-normalisation policy applied to every phrasing,
// whatever format it came from. The same policy is stored in the
// model manifest and re-applied to queries at inference time, so
// training and classification always see identical text.
//
// Cleaning steps (applied in order):
//   1. Control, zero-width, BOM and non-breaking characters → space
//   2. Casefold to lowercase              (policy.lowercase)
//   3. Punctuation → space                (policy.strip_punctuation)
//      ASCII punctuation plus ¿ ¡ « » “ ” ‘ ’ …
//   4. Collapse whitespace runs into a single space
//   5. Trim both ends
//
// The result contains only single-space separated tokens, which
// is exactly what the WhitespaceSplit pre-tokenizer expects.

use serde::{Deserialize, Serialize};

/// Which optional normalisation steps are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationPolicy {
    /// Lowercase all text
    #[serde(default = "enabled")]
    pub lowercase: bool,

    /// Replace punctuation with spaces
    #[serde(default = "enabled")]
    pub strip_punctuation: bool,
}

fn enabled() -> bool {
    true
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_punctuation: true,
        }
    }
}

/// Applies a `NormalizationPolicy` to phrasings and queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    policy: NormalizationPolicy,
}

impl Preprocessor {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Normalise a raw phrasing. May return an empty string.
    pub fn clean(&self, text: &str) -> String {
        // ── Steps 1-3: per-character mapping ─────────────────────────────────
        let mapped: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c if self.policy.strip_punctuation && is_punctuation(c) => ' ',
                c => c,
            })
            .collect();

        let folded = if self.policy.lowercase {
            mapped.to_lowercase()
        } else {
            mapped
        };

        // ── Steps 4-5: collapse whitespace and trim ──────────────────────────
        folded.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '¿' | '¡' | '«' | '»' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' | '…'
        )
}
