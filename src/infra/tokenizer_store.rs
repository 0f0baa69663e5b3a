// ============================================================
// Layer 6 - Tokenizer Store
// ============================================================
// Persists the Vocabulary (as a HuggingFace tokenizer.json) and
// the LabelEncoder (as an ordered {label: id} JSON object) into
// an artifact namespace.
//
// Both files are co-versioned with the model: saving returns
// their blake3 digests, the ModelManifest records them, and
// loading refuses a file whose digest no longer matches.

use std::path::PathBuf;

use crate::data::encoder::{LabelEncoder, Vocabulary};
use crate::error::{PipelineError, Result};
use crate::infra::artifact_store::{digest, ArtifactKind, ArtifactNamespace, ArtifactStore};
use crate::infra::checkpoint::ModelManifest;

/// Serialized encoders and what their bytes hash to.
#[derive(Debug, Clone)]
pub struct EncodedEncoders {
    pub tokenizer_bytes:   Vec<u8>,
    pub labels_bytes:      Vec<u8>,
    pub vocabulary_digest: String,
    pub labels_digest:     String,
}

impl EncodedEncoders {
    pub fn new(vocabulary: &Vocabulary, labels: &LabelEncoder) -> Result<Self> {
        let tokenizer_bytes = vocabulary.to_json_bytes()?;
        let labels_bytes = labels.to_json_bytes()?;
        Ok(Self {
            vocabulary_digest: digest(&tokenizer_bytes),
            labels_digest:     digest(&labels_bytes),
            tokenizer_bytes,
            labels_bytes,
        })
    }

    /// The two files, in publish order.
    pub fn into_artifacts(self) -> [(ArtifactKind, Vec<u8>); 2] {
        [
            (ArtifactKind::Tokenizer, self.tokenizer_bytes),
            (ArtifactKind::LabelEncoder, self.labels_bytes),
        ]
    }
}

/// Where the encoders landed and what their bytes hash to.
#[derive(Debug, Clone)]
pub struct SavedEncoders {
    pub tokenizer_path:    PathBuf,
    pub labels_path:       PathBuf,
    pub vocabulary_digest: String,
    pub labels_digest:     String,
}

pub struct TokenizerStore {
    store:     ArtifactStore,
    namespace: ArtifactNamespace,
}

impl TokenizerStore {
    pub fn new(store: &ArtifactStore, namespace: &ArtifactNamespace) -> Self {
        Self { store: store.clone(), namespace: namespace.clone() }
    }

    /// Publish tokenizer.json and label_encoder.json as one set.
    pub fn save(&self, vocabulary: &Vocabulary, labels: &LabelEncoder) -> Result<SavedEncoders> {
        let encoded = EncodedEncoders::new(vocabulary, labels)?;
        let vocabulary_digest = encoded.vocabulary_digest.clone();
        let labels_digest = encoded.labels_digest.clone();

        self.store.publish_set(&self.namespace, &encoded.into_artifacts())?;

        tracing::info!(
            "Saved tokenizer ({} tokens) and label encoder ({} labels) to '{}'",
            vocabulary.len(),
            labels.len(),
            self.namespace.dir().display()
        );

        Ok(SavedEncoders {
            tokenizer_path: self.namespace.path(ArtifactKind::Tokenizer),
            labels_path:    self.namespace.path(ArtifactKind::LabelEncoder),
            vocabulary_digest,
            labels_digest,
        })
    }

    /// Load the vocabulary the manifest's model was trained with.
    pub fn load_vocabulary(&self, manifest: &ModelManifest) -> Result<Vocabulary> {
        let bytes = self.load_checked(ArtifactKind::Tokenizer, &manifest.vocabulary_digest)?;
        Vocabulary::from_json_bytes(&bytes, manifest.normalization, manifest.classifier.max_len)
    }

    /// Load the label encoder the manifest's model was trained with.
    pub fn load_labels(&self, manifest: &ModelManifest) -> Result<LabelEncoder> {
        let bytes = self.load_checked(ArtifactKind::LabelEncoder, &manifest.labels_digest)?;
        let labels = LabelEncoder::from_json_bytes(&bytes)?;
        if labels.len() != manifest.classifier.num_classes {
            return Err(self.stale(ArtifactKind::LabelEncoder));
        }
        Ok(labels)
    }

    /// Load whatever label encoder is published, without a model.
    pub fn load_published_labels(&self) -> Result<LabelEncoder> {
        let bytes = self.store.load(&self.namespace, ArtifactKind::LabelEncoder)?;
        LabelEncoder::from_json_bytes(&bytes)
    }

    fn load_checked(&self, kind: ArtifactKind, expected: &str) -> Result<Vec<u8>> {
        let bytes = self.store.load(&self.namespace, kind)?;
        if digest(&bytes) != expected {
            return Err(self.stale(kind));
        }
        Ok(bytes)
    }

    fn stale(&self, kind: ArtifactKind) -> PipelineError {
        PipelineError::StaleArtifact {
            namespace: self.namespace.name().to_string(),
            kind: kind.file_name().to_string(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::{fit, TokenizerOptions};
    use crate::domain::{format::Format, sample::{Sample, SampleSet}};
    use crate::error::ErrorKind;
    use crate::ml::model::TextClassifierConfig;

    fn samples() -> SampleSet {
        SampleSet::new(vec![
            Sample::new("hello there", "greeting"),
            Sample::new("good bye", "farewell"),
            Sample::new("hello again", "greeting"),
        ])
    }

    fn manifest(saved: &SavedEncoders, vocabulary: &Vocabulary, labels: &LabelEncoder) -> ModelManifest {
        ModelManifest::new(
            TextClassifierConfig::new(vocabulary.len(), labels.len(), vocabulary.max_len()),
            vocabulary.normalization(),
            saved.vocabulary_digest.clone(),
            saved.labels_digest.clone(),
            "weights".to_string(),
            42,
            1,
        )
    }

    #[test]
    fn test_save_and_reload_encoders() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Json);
        let (vocabulary, labels) = fit(&samples(), &TokenizerOptions::default()).unwrap();

        let tokenizers = TokenizerStore::new(&store, &ns);
        let saved = tokenizers.save(&vocabulary, &labels).unwrap();
        assert!(saved.tokenizer_path.is_file());
        assert!(saved.labels_path.is_file());

        let manifest = manifest(&saved, &vocabulary, &labels);
        let reloaded = tokenizers.load_vocabulary(&manifest).unwrap();
        assert_eq!(reloaded.tokens(), vocabulary.tokens());
        assert_eq!(reloaded.encode("hello there").unwrap(), vocabulary.encode("hello there").unwrap());
        assert_eq!(tokenizers.load_labels(&manifest).unwrap(), labels);
    }

    #[test]
    fn test_tampered_tokenizer_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Yaml);
        let (vocabulary, labels) = fit(&samples(), &TokenizerOptions::default()).unwrap();

        let tokenizers = TokenizerStore::new(&store, &ns);
        let saved = tokenizers.save(&vocabulary, &labels).unwrap();
        let manifest = manifest(&saved, &vocabulary, &labels);

        let mut bytes = std::fs::read(&saved.tokenizer_path).unwrap();
        bytes.push(b'\n');
        store.publish(&ns, ArtifactKind::Tokenizer, &bytes).unwrap();

        let err = tokenizers.load_vocabulary(&manifest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleArtifact);
    }

    #[test]
    fn test_missing_labels_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let tokenizers = TokenizerStore::new(&store, &store.namespace(Format::Toml));
        let err = tokenizers.load_published_labels().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
    }
}
