// ============================================================
// Layer 2 - ConvertUseCase
// ============================================================
// Turns the published float model of one namespace into the
// int8 export:
//
//   Step 1: Load weights + manifest   (Layer 6 - infra)
//   Step 2: Quantize                  (Layer 5 - ml)
//   Step 3: Encode, decode, verify    (Layer 5 - ml)
//   Step 4: Publish text_classifier.q8 (Layer 6 - infra)
//
// A namespace without a trained model is a MissingModel error;
// conversion never trains implicitly. The export is a pure
// function of the weight values, so converting an unchanged
// model twice writes identical bytes.

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::{format::Format, traits::Classifier};
use crate::error::{PipelineError, Result};
use crate::infra::{
    artifact_store::{ArtifactKind, ArtifactNamespace, ArtifactStore},
    checkpoint::{weights_digest, ModelStore},
};
use crate::ml::{
    inferencer::Inferencer,
    model::{TextClassifier, TextClassifierConfig},
    quantize::{probe_inputs, QuantizedModel},
    trainer::{InferBackend, TrainedModel},
};

/// What a conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub namespace:         String,
    pub path:              PathBuf,
    pub bytes:             usize,
    pub source_digest:     String,
    /// Float32 parameter bytes / exported bytes
    pub compression_ratio: f32,
    /// Largest |float - int8| probability seen on the probe inputs
    pub max_drift:         f32,
}

/// Quantize an in-memory trained model and verify the result.
pub fn convert(trained: &TrainedModel) -> Result<QuantizedModel> {
    let weights = trained.model.to_weights()?;
    let quantized =
        QuantizedModel::from_weights(&trained.config, &weights, weights_digest(&weights))?;
    let decoded = QuantizedModel::from_bytes(&quantized.to_bytes()?)?;
    decoded.verify(&probe_inputs(&trained.config))?;
    Ok(decoded)
}

pub struct ConvertUseCase {
    store: ArtifactStore,
}

impl ConvertUseCase {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Convert the model published for `format`, holding its namespace lock.
    pub fn execute(&self, format: Format) -> Result<ConversionReport> {
        let namespace = self.store.namespace(format);
        let _lock = self.store.lock(&namespace);
        self.convert_unlocked(&namespace)
    }

    /// Whether the published export was built from other weights than
    /// the current model. Fails when nothing has been exported.
    pub fn is_stale(&self, format: Format) -> Result<bool> {
        let namespace = self.store.namespace(format);
        quantized_staleness(&self.store, &namespace)?.ok_or_else(|| {
            PipelineError::ArtifactNotFound {
                namespace: namespace.name().to_string(),
                kind: ArtifactKind::QuantizedModel.file_name().to_string(),
            }
        })
    }

    /// The caller must already hold the namespace lock.
    pub(crate) fn convert_unlocked(&self, namespace: &ArtifactNamespace) -> Result<ConversionReport> {
        let (model, manifest) = ModelStore::new(&self.store, namespace).load()?;
        let config = manifest.classifier.clone();

        let weights = model.to_weights()?;
        let quantized = QuantizedModel::from_weights(&config, &weights, manifest.weights_digest.clone())?;
        let bytes = quantized.to_bytes()?;

        // Verify what will actually be read back, not the in-memory copy
        let decoded = QuantizedModel::from_bytes(&bytes)?;
        let probes = probe_inputs(&config);
        decoded.verify(&probes)?;
        let max_drift = probe_drift(model, &config, &decoded, &probes)?;

        let path = self.store.publish(namespace, ArtifactKind::QuantizedModel, &bytes)?;
        let compression_ratio = (config.num_params() * 4) as f32 / bytes.len().max(1) as f32;

        tracing::info!(
            "Converted namespace '{}': {} bytes, {:.1}x smaller, max probe drift {:.4}",
            namespace.name(),
            bytes.len(),
            compression_ratio,
            max_drift
        );

        Ok(ConversionReport {
            namespace: namespace.name().to_string(),
            path,
            bytes: bytes.len(),
            source_digest: manifest.weights_digest,
            compression_ratio,
            max_drift,
        })
    }
}

/// `None` when no export exists, otherwise whether it is stale.
/// An export with no model beside it counts as stale.
pub fn quantized_staleness(store: &ArtifactStore, namespace: &ArtifactNamespace) -> Result<Option<bool>> {
    if !store.exists(namespace, ArtifactKind::QuantizedModel) {
        return Ok(None);
    }
    let models = ModelStore::new(store, namespace);
    if !models.has_model() {
        return Ok(Some(true));
    }
    let manifest = models.load_manifest()?;
    let quantized = QuantizedModel::from_bytes(&store.load(namespace, ArtifactKind::QuantizedModel)?)?;
    Ok(Some(quantized.source_digest != manifest.weights_digest))
}

fn probe_drift(
    model:     TextClassifier<InferBackend>,
    config:    &TextClassifierConfig,
    quantized: &QuantizedModel,
    probes:    &[Vec<u32>],
) -> Result<f32> {
    let float = Inferencer::new(model, config.clone());
    let mut max_drift = 0.0f32;
    for probe in probes {
        let expected = float.predict_proba(probe)?;
        let actual = quantized.predict_proba(probe)?;
        for (e, a) in expected.iter().zip(&actual) {
            max_drift = max_drift.max((e - a).abs());
        }
    }
    Ok(max_drift)
}
