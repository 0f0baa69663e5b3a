// ============================================================
// Layer 2 - Artifact Housekeeping
// ============================================================
// The small operations around a namespace that are not part of
// the training pipeline itself:
//
//   status - which artifacts exist, is the int8 export stale
//   export - copy an artifact (by default the int8 export) out
//   clear  - delete a namespace's published artifacts
//   check  - compare a document's labels with a trained model's

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::application::convert_use_case::quantized_staleness;
use crate::data::interpreter::interpret_path;
use crate::domain::format::Format;
use crate::error::Result;
use crate::infra::{
    artifact_store::{ArtifactKind, ArtifactStore},
    tokenizer_store::TokenizerStore,
};

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub file:    &'static str,
    pub path:    PathBuf,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStatus {
    pub namespace:       String,
    pub dir:             PathBuf,
    pub artifacts:       Vec<ArtifactStatus>,
    /// None when there is no int8 export
    pub quantized_stale: Option<bool>,
}

impl NamespaceStatus {
    pub fn is_empty(&self) -> bool {
        self.artifacts.iter().all(|a| !a.present)
    }
}

/// Labels that appear on only one side of a document/model pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelComparison {
    pub namespace:             String,
    pub document_labels:       usize,
    pub model_labels:          usize,
    pub missing_from_model:    Vec<String>,
    pub missing_from_document: Vec<String>,
}

impl LabelComparison {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_model.is_empty() && self.missing_from_document.is_empty()
    }
}

pub struct ArtifactsUseCase {
    store: ArtifactStore,
}

impl ArtifactsUseCase {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn status(&self, format: Format) -> Result<NamespaceStatus> {
        let namespace = self.store.namespace(format);
        let artifacts = ArtifactKind::ALL
            .iter()
            .map(|&kind| ArtifactStatus {
                file:    kind.file_name(),
                path:    namespace.path(kind),
                present: self.store.exists(&namespace, kind),
            })
            .collect();
        Ok(NamespaceStatus {
            namespace: namespace.name().to_string(),
            dir: namespace.dir().to_path_buf(),
            artifacts,
            quantized_stale: quantized_staleness(&self.store, &namespace)?,
        })
    }

    /// Copy `kind` from the namespace to `dest` (a file or a directory).
    pub fn export(&self, format: Format, kind: ArtifactKind, dest: &Path) -> Result<PathBuf> {
        self.store.export(&self.store.namespace(format), kind, dest)
    }

    /// Remove every published artifact, waiting for any run in progress.
    pub fn clear(&self, format: Format) -> Result<usize> {
        let namespace = self.store.namespace(format);
        let _lock = self.store.lock(&namespace);
        self.store.clear(&namespace)
    }

    /// Compare the labels in `document` with the label encoder trained
    /// for the document's format.
    pub fn check(&self, document: &Path, format: Option<Format>) -> Result<LabelComparison> {
        let document = interpret_path(document, format)?;
        let namespace = self.store.namespace(document.format);
        let encoder = TokenizerStore::new(&self.store, &namespace).load_published_labels()?;

        let doc_labels = document.labels();
        let model_labels: Vec<&str> = encoder.labels().collect();

        let comparison = LabelComparison {
            namespace: namespace.name().to_string(),
            document_labels: doc_labels.len(),
            model_labels: model_labels.len(),
            missing_from_model: doc_labels
                .iter()
                .filter(|l| encoder.id(l).is_none())
                .map(|l| l.to_string())
                .collect(),
            missing_from_document: model_labels
                .iter()
                .filter(|l| !doc_labels.contains(l))
                .map(|l| l.to_string())
                .collect(),
        };

        if !comparison.is_consistent() {
            tracing::warn!(
                "Namespace '{}': {} labels missing from the model, {} missing from the document",
                comparison.namespace,
                comparison.missing_from_model.len(),
                comparison.missing_from_document.len()
            );
        }
        Ok(comparison)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn store_with_labels(dir: &Path, labels: &str) -> ArtifactStore {
        let store = ArtifactStore::new(dir.join("generated"));
        let ns = store.namespace(Format::Json);
        store.publish(&ns, ArtifactKind::LabelEncoder, labels.as_bytes()).unwrap();
        store
    }

    #[test]
    fn test_status_of_empty_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let status = ArtifactsUseCase::new(ArtifactStore::new(dir.path())).status(Format::Yaml).unwrap();
        assert_eq!(status.namespace, "yaml");
        assert_eq!(status.artifacts.len(), 6);
        assert!(status.is_empty());
        assert_eq!(status.quantized_stale, None);
    }

    #[test]
    fn test_export_without_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactsUseCase::new(ArtifactStore::new(dir.path()))
            .export(Format::Json, ArtifactKind::QuantizedModel, dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
    }

    #[test]
    fn test_clear_reports_removed_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_labels(dir.path(), r#"{"a": 0, "b": 1}"#);
        let use_case = ArtifactsUseCase::new(store);
        assert_eq!(use_case.clear(Format::Json).unwrap(), 1);
        assert_eq!(use_case.clear(Format::Json).unwrap(), 0);
    }

    #[test]
    fn test_check_reports_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_labels(dir.path(), r#"{"greeting": 0, "farewell": 1}"#);
        let doc = dir.path().join("faq.json");
        std::fs::write(&doc, r#"{"greeting": ["hi"], "thanks": ["thank you"]}"#).unwrap();

        let comparison = ArtifactsUseCase::new(store).check(&doc, None).unwrap();
        assert_eq!(comparison.namespace, "json");
        assert_eq!(comparison.missing_from_model, vec!["thanks"]);
        assert_eq!(comparison.missing_from_document, vec!["farewell"]);
        assert!(!comparison.is_consistent());
    }

    #[test]
    fn test_check_consistent_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_labels(dir.path(), r#"{"greeting": 0, "farewell": 1}"#);
        let doc = dir.path().join("faq.json");
        std::fs::write(&doc, r#"{"farewell": ["bye"], "greeting": ["hi"]}"#).unwrap();
        assert!(ArtifactsUseCase::new(store).check(&doc, None).unwrap().is_consistent());
    }
}
