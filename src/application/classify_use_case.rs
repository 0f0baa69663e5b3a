// ============================================================
// Layer 2 - ClassifyUseCase
// ============================================================
// Loads one namespace's artifact set and labels free-text
// queries with it:
//
//   query → normalise (training policy) → tokenizer ids
//         → float model or int8 export → top-k labels
//
// The tokenizer and label encoder are only accepted when their
// digests match the model manifest, and the int8 export only
// when it was built from the current weights.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::data::encoder::{LabelEncoder, Vocabulary};
use crate::domain::{format::Format, traits::Classifier};
use crate::error::{PipelineError, Result};
use crate::infra::{
    artifact_store::{ArtifactKind, ArtifactStore},
    checkpoint::ModelStore,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{inferencer::Inferencer, quantize::QuantizedModel};

/// Which model file answers the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Runtime {
    /// text_classifier.mpk through Burn
    #[default]
    Float,
    /// text_classifier.q8 through the int8 forward pass
    Quantized,
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Float => f.write_str("float"),
            Runtime::Quantized => f.write_str("quantized"),
        }
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float" | "f32" => Ok(Runtime::Float),
            "quantized" | "int8" | "q8" => Ok(Runtime::Quantized),
            other => Err(format!("unknown runtime '{other}' (expected float or quantized)")),
        }
    }
}

/// One scored label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label:       String,
    pub probability: f32,
}

pub struct ClassifyUseCase {
    vocabulary: Vocabulary,
    labels:     LabelEncoder,
    classifier: Box<dyn Classifier>,
    runtime:    Runtime,
}

impl ClassifyUseCase {
    /// Load the artifact set published for `format`.
    pub fn load(store: &ArtifactStore, format: Format, runtime: Runtime) -> Result<Self> {
        let namespace = store.namespace(format);
        let models = ModelStore::new(store, &namespace);
        let tokenizers = TokenizerStore::new(store, &namespace);

        let (classifier, manifest) = match runtime {
            Runtime::Float => {
                let (model, manifest) = models.load()?;
                let config = manifest.classifier.clone();
                (Box::new(Inferencer::new(model, config)) as Box<dyn Classifier>, manifest)
            }
            Runtime::Quantized => {
                let manifest = models.load_manifest()?;
                let bytes = store.load(&namespace, ArtifactKind::QuantizedModel)?;
                let quantized = QuantizedModel::from_bytes(&bytes)?;
                if quantized.source_digest != manifest.weights_digest {
                    return Err(PipelineError::StaleArtifact {
                        namespace: namespace.name().to_string(),
                        kind: ArtifactKind::QuantizedModel.file_name().to_string(),
                    });
                }
                (Box::new(quantized) as Box<dyn Classifier>, manifest)
            }
        };

        let vocabulary = tokenizers.load_vocabulary(&manifest)?;
        let labels = tokenizers.load_labels(&manifest)?;
        tracing::info!(
            "Loaded {} runtime for namespace '{}' ({} labels)",
            runtime,
            namespace.name(),
            labels.len()
        );

        Ok(Self { vocabulary, labels, classifier, runtime })
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn labels(&self) -> &LabelEncoder {
        &self.labels
    }

    /// The `top_k` most probable labels, best first.
    pub fn classify(&self, query: &str, top_k: usize) -> Result<Vec<Prediction>> {
        let encoded = self.vocabulary.encode_query(query)?;
        let probs = self.classifier.predict_proba(&encoded.input_ids)?;

        let mut ranked: Vec<(usize, f32)> = probs.into_iter().enumerate().collect();
        // Stable sort keeps the lower class id first on ties
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranked
            .into_iter()
            .take(top_k)
            .map(|(id, probability)| {
                let label = self.labels.label(id as u32).ok_or_else(|| {
                    PipelineError::Serialization(format!("class id {id} has no label"))
                })?;
                Ok(Prediction { label: label.to_string(), probability })
            })
            .collect()
    }
}
