// ============================================================
// Layer 4 - Dataset Builder
// ============================================================
// Flattens the canonical schema into a SampleSet: one Sample per
// phrasing, in document order.
//
//   { greeting: [hi, hello], farewell: [bye] }
//       → (hi, greeting) (hello, greeting) (bye, farewell)
//
// Malformed records (missing label, missing text, a number where
// a phrasing should be, text that normalises to nothing) are
// handled by `MalformedPolicy`:
//   Skip - drop the record, keep a warning, carry on   (default)
//   Fail - stop at the first malformed record
//
// Duplicates are handled by `DuplicatePolicy`:
//   Keep - keep every occurrence silently                (default)
//   Warn - keep them, record a warning
//   Drop - keep only the first (text, label) occurrence
//
// Zero resulting samples is always a terminal EmptyDataset error.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::data::preprocessor::{NormalizationPolicy, Preprocessor};
use crate::domain::{
    document::{CanonicalItem, ConfigDocument},
    sample::{Sample, SampleSet},
};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Keep,
    Warn,
    Drop,
}

/// Dataset construction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetOptions {
    #[serde(default)]
    pub normalization: NormalizationPolicy,
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

/// Something the builder skipped or noticed, with its entry position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetWarning {
    pub position: usize,
    pub message: String,
}

/// The builder's output: the samples plus everything it warned about.
#[derive(Debug, Clone)]
pub struct DatasetBuild {
    pub samples: SampleSet,
    pub warnings: Vec<DatasetWarning>,
    pub skipped: usize,
}

pub struct DatasetBuilder {
    options: DatasetOptions,
    preprocessor: Preprocessor,
}

impl DatasetBuilder {
    pub fn new(options: DatasetOptions) -> Self {
        Self {
            options,
            preprocessor: Preprocessor::new(options.normalization),
        }
    }

    /// Flatten `document` into an ordered SampleSet.
    pub fn build(&self, document: &ConfigDocument) -> Result<DatasetBuild> {
        let mut samples = SampleSet::default();
        let mut warnings = Vec::new();
        let mut skipped = 0usize;
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
        let mut label_of_text: HashMap<String, String> = HashMap::new();

        for entry in &document.entries {
            let mut reject = |message: String, warnings: &mut Vec<DatasetWarning>| {
                self.reject(document, entry.position, message, warnings)
                    .map(|()| skipped += 1)
            };

            let Some(label) = entry.label.as_deref() else {
                reject("record has no label".to_string(), &mut warnings)?;
                continue;
            };
            if entry.items.is_empty() {
                reject(format!("label '{label}' has no phrasings"), &mut warnings)?;
                continue;
            }

            for item in &entry.items {
                let raw = match item {
                    CanonicalItem::Text(raw) => raw,
                    CanonicalItem::Malformed(reason) => {
                        reject(format!("label '{label}': {reason}"), &mut warnings)?;
                        continue;
                    }
                };

                let text = self.preprocessor.clean(raw);
                if text.is_empty() {
                    reject(
                        format!("label '{label}': phrasing '{raw}' is empty after normalisation"),
                        &mut warnings,
                    )?;
                    continue;
                }

                let pair = (text.clone(), label.to_string());
                if seen_pairs.contains(&pair) {
                    match self.options.duplicates {
                        DuplicatePolicy::Keep => {}
                        DuplicatePolicy::Warn => warnings.push(DatasetWarning {
                            position: entry.position,
                            message: format!("duplicate phrasing '{text}' for label '{label}'"),
                        }),
                        DuplicatePolicy::Drop => continue,
                    }
                } else if let Some(other) = label_of_text.get(&text) {
                    if self.options.duplicates != DuplicatePolicy::Keep && other != label {
                        warnings.push(DatasetWarning {
                            position: entry.position,
                            message: format!(
                                "phrasing '{text}' appears under '{other}' and '{label}'"
                            ),
                        });
                    }
                }

                label_of_text.entry(text.clone()).or_insert_with(|| label.to_string());
                seen_pairs.insert(pair);
                samples.push(Sample::new(text, label));
            }
        }

        if samples.is_empty() {
            return Err(PipelineError::EmptyDataset { skipped });
        }

        tracing::info!(
            "Built {} samples across {} labels ({} records skipped)",
            samples.len(),
            samples.distinct_labels().len(),
            skipped
        );

        Ok(DatasetBuild {
            samples,
            warnings,
            skipped,
        })
    }

    fn reject(
        &self,
        document: &ConfigDocument,
        position: usize,
        message: String,
        warnings: &mut Vec<DatasetWarning>,
    ) -> Result<()> {
        if self.options.on_malformed == MalformedPolicy::Fail {
            return Err(PipelineError::Schema {
                format: document.format,
                message: format!("entry {position}: {message}"),
            });
        }
        tracing::warn!("Skipping entry {}: {}", position, message);
        warnings.push(DatasetWarning { position, message });
        Ok(())
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new(DatasetOptions::default())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::interpreter::interpret;
    use crate::domain::{document::CanonicalEntry, format::Format};
    use crate::error::ErrorKind;

    fn doc(entries: Vec<CanonicalEntry>) -> ConfigDocument {
        ConfigDocument::new(Format::Json, entries)
    }

    fn text(s: &str) -> CanonicalItem {
        CanonicalItem::Text(s.to_string())
    }

    #[test]
    fn test_flattens_in_document_order() {
        let document = interpret(
            Format::Json,
            r#"{"greeting": ["hi", "hello"], "farewell": ["bye"]}"#,
        )
        .unwrap();
        let build = DatasetBuilder::default().build(&document).unwrap();

        let pairs: Vec<(&str, &str)> = build
            .samples
            .iter()
            .map(|s| (s.text.as_str(), s.label.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("hi", "greeting"), ("hello", "greeting"), ("bye", "farewell")]
        );
        assert!(build.warnings.is_empty());
    }

    #[test]
    fn test_malformed_records_are_skipped_with_warning() {
        let document = doc(vec![
            CanonicalEntry::new(None, vec![text("orphan")], 0),
            CanonicalEntry::new(
                Some("a".into()),
                vec![text("ok"), CanonicalItem::Malformed("a number".into()), text("?!")],
                1,
            ),
        ]);
        let build = DatasetBuilder::default().build(&document).unwrap();
        assert_eq!(build.samples.len(), 1);
        assert_eq!(build.skipped, 3);
        assert_eq!(build.warnings.len(), 3);
        assert_eq!(build.warnings[0].position, 0);
    }

    #[test]
    fn test_fail_policy_stops_at_first_malformed_record() {
        let document = doc(vec![
            CanonicalEntry::new(Some("a".into()), vec![text("ok")], 0),
            CanonicalEntry::new(None, vec![text("orphan")], 1),
        ]);
        let builder = DatasetBuilder::new(DatasetOptions {
            on_malformed: MalformedPolicy::Fail,
            ..Default::default()
        });
        let err = builder.build(&document).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_everything_skipped_is_empty_dataset() {
        let document = doc(vec![CanonicalEntry::new(
            Some("a".into()),
            vec![text("..."), text("!!")],
            0,
        )]);
        match DatasetBuilder::default().build(&document) {
            Err(PipelineError::EmptyDataset { skipped }) => assert_eq!(skipped, 2),
            other => panic!("expected EmptyDataset, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicates_kept_by_default() {
        let document = doc(vec![
            CanonicalEntry::new(Some("a".into()), vec![text("hi"), text("Hi!")], 0),
            CanonicalEntry::new(Some("b".into()), vec![text("hi")], 1),
        ]);
        let build = DatasetBuilder::default().build(&document).unwrap();
        assert_eq!(build.samples.len(), 3);
        assert!(build.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_warn_and_drop() {
        let document = doc(vec![
            CanonicalEntry::new(Some("a".into()), vec![text("hi"), text("Hi!")], 0),
            CanonicalEntry::new(Some("b".into()), vec![text("hi")], 1),
        ]);

        let warn = DatasetBuilder::new(DatasetOptions {
            duplicates: DuplicatePolicy::Warn,
            ..Default::default()
        })
        .build(&document)
        .unwrap();
        assert_eq!(warn.samples.len(), 3);
        assert_eq!(warn.warnings.len(), 2);

        let drop = DatasetBuilder::new(DatasetOptions {
            duplicates: DuplicatePolicy::Drop,
            ..Default::default()
        })
        .build(&document)
        .unwrap();
        assert_eq!(drop.samples.len(), 2);
        assert_eq!(drop.samples.distinct_labels(), vec!["a", "b"]);
    }
}
