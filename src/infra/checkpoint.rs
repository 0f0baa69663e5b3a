// ============================================================
// Layer 6 - Model Store
// ============================================================
// Saves and restores the trained classifier using Burn's
// NamedMpkBytesRecorder (full precision MessagePack).
//
// What gets saved per namespace:
//   1. text_classifier.mpk  - all learned parameters
//   2. text_classifier.json - ModelManifest: the architecture
//                             config plus digests of the
//                             tokenizer, labels and weights
//
// The architecture config is needed to rebuild an empty model
// before loading the record into it. The digests are what make
// the four files one artifact set: a manifest only accepts the
// tokenizer/labels/weights whose bytes it names.
//
// Burn's record bytes carry random parameter ids, so the weights
// digest hashes the parameter VALUES instead. Retraining with the
// same seed yields the same digest even when the .mpk differs.

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::NormalizationPolicy;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::infra::artifact_store::{ArtifactKind, ArtifactNamespace, ArtifactStore};
use crate::ml::model::{FloatWeights, TextClassifier, TextClassifierConfig};
use crate::ml::trainer::{InferBackend, TrainedModel};

pub const MANIFEST_VERSION: u32 = 1;

/// Blake3 over the little-endian bytes of every parameter, in a fixed order.
pub fn weights_digest(weights: &FloatWeights) -> String {
    let mut hasher = blake3::Hasher::new();
    for values in [
        &weights.embedding,
        &weights.hidden_weight,
        &weights.hidden_bias,
        &weights.output_weight,
        &weights.output_bias,
    ] {
        hasher.update(&(values.len() as u64).to_le_bytes());
        for v in values {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ─── ModelManifest ────────────────────────────────────────────────────────────

/// Shape contract of a published model. Vocabulary and labels are
/// referenced by digest, not embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version:    u32,
    pub classifier:        TextClassifierConfig,
    pub normalization:     NormalizationPolicy,
    pub vocabulary_digest: String,
    pub labels_digest:     String,
    pub weights_digest:    String,
    pub seed:              u64,
    pub epochs_run:        usize,
}

impl ModelManifest {
    pub fn new(
        classifier:        TextClassifierConfig,
        normalization:     NormalizationPolicy,
        vocabulary_digest: String,
        labels_digest:     String,
        weights_digest:    String,
        seed:              u64,
        epochs_run:        usize,
    ) -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            classifier,
            normalization,
            vocabulary_digest,
            labels_digest,
            weights_digest,
            seed,
            epochs_run,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::Serialization(format!("model manifest: {e}")))?;
        if manifest.format_version != MANIFEST_VERSION {
            return Err(PipelineError::Serialization(format!(
                "model manifest version {} is not supported (expected {MANIFEST_VERSION})",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }
}

// ─── ModelStore ───────────────────────────────────────────────────────────────

/// Weights record and manifest, serialized but not yet published.
#[derive(Debug, Clone)]
pub struct EncodedModel {
    pub manifest:       ModelManifest,
    pub record_bytes:   Vec<u8>,
    pub manifest_bytes: Vec<u8>,
}

impl EncodedModel {
    pub fn new(
        trained:           &TrainedModel,
        normalization:     NormalizationPolicy,
        vocabulary_digest: String,
        labels_digest:     String,
    ) -> Result<Self> {
        let weights = trained.model.to_weights()?;
        let record_bytes = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .record(trained.model.clone().into_record(), ())
            .map_err(|e| PipelineError::Serialization(format!("cannot record model: {e}")))?;

        let manifest = ModelManifest::new(
            trained.config.clone(),
            normalization,
            vocabulary_digest,
            labels_digest,
            weights_digest(&weights),
            trained.seed,
            trained.epochs_run,
        );
        let manifest_bytes = manifest.to_json_bytes()?;
        Ok(Self { manifest, record_bytes, manifest_bytes })
    }

    /// Weights first, then the manifest that vouches for them.
    pub fn into_artifacts(self) -> [(ArtifactKind, Vec<u8>); 2] {
        [
            (ArtifactKind::ModelWeights, self.record_bytes),
            (ArtifactKind::ModelManifest, self.manifest_bytes),
        ]
    }
}

/// Paths of a freshly published model.
#[derive(Debug, Clone)]
pub struct SavedModel {
    pub manifest:      ModelManifest,
    pub weights_path:  std::path::PathBuf,
    pub manifest_path: std::path::PathBuf,
}

pub struct ModelStore {
    store:     ArtifactStore,
    namespace: ArtifactNamespace,
}

impl ModelStore {
    pub fn new(store: &ArtifactStore, namespace: &ArtifactNamespace) -> Self {
        Self { store: store.clone(), namespace: namespace.clone() }
    }

    /// True when both the weights and the manifest are published.
    pub fn has_model(&self) -> bool {
        self.store.exists(&self.namespace, ArtifactKind::ModelWeights)
            && self.store.exists(&self.namespace, ArtifactKind::ModelManifest)
    }

    /// Publish the weights and the manifest as one set.
    pub fn save(
        &self,
        trained:           &TrainedModel,
        normalization:     NormalizationPolicy,
        vocabulary_digest: String,
        labels_digest:     String,
    ) -> Result<SavedModel> {
        let encoded = EncodedModel::new(trained, normalization, vocabulary_digest, labels_digest)?;
        let manifest = encoded.manifest.clone();
        self.store.publish_set(&self.namespace, &encoded.into_artifacts())?;

        let weights_path = self.namespace.path(ArtifactKind::ModelWeights);
        tracing::info!(
            "Saved model ({} parameters) to '{}'",
            trained.config.num_params(),
            weights_path.display()
        );
        Ok(SavedModel {
            manifest,
            weights_path,
            manifest_path: self.namespace.path(ArtifactKind::ModelManifest),
        })
    }

    /// Read the manifest. Absent manifest means no trained model.
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let bytes = self
            .store
            .load(&self.namespace, ArtifactKind::ModelManifest)
            .map_err(|e| self.missing_model(e))?;
        ModelManifest::from_json_bytes(&bytes)
    }

    /// Rebuild the classifier and check it against the manifest.
    pub fn load(&self) -> Result<(TextClassifier<InferBackend>, ModelManifest)> {
        let manifest = self.load_manifest()?;
        let record_bytes = self
            .store
            .load(&self.namespace, ArtifactKind::ModelWeights)
            .map_err(|e| self.missing_model(e))?;

        let device = Default::default();
        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .load(record_bytes, &device)
            .map_err(|e| PipelineError::Serialization(format!("cannot load model record: {e}")))?;
        let model = manifest
            .classifier
            .init::<InferBackend>(manifest.seed, &device)
            .load_record(record);

        if weights_digest(&model.to_weights()?) != manifest.weights_digest {
            return Err(PipelineError::StaleArtifact {
                namespace: self.namespace.name().to_string(),
                kind: ArtifactKind::ModelWeights.file_name().to_string(),
            });
        }

        tracing::info!(
            "Loaded model from namespace '{}' (epochs_run={})",
            self.namespace.name(),
            manifest.epochs_run
        );
        Ok((model, manifest))
    }

    fn missing_model(&self, err: PipelineError) -> PipelineError {
        if err.kind() == ErrorKind::ArtifactNotFound {
            PipelineError::MissingModel { namespace: self.namespace.name().to_string() }
        } else {
            err
        }
    }
}
