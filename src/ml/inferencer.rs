// ============================================================
// Layer 5 - Inferencer
// ============================================================
use burn::prelude::*;

use crate::data::encoder::{OOV_ID, PAD_ID};
use crate::domain::traits::Classifier;
use crate::error::{PipelineError, Result};
use crate::ml::model::{TextClassifier, TextClassifierConfig};
use crate::ml::trainer::InferBackend;

/// Runs the float classifier on the CPU backend.
pub struct Inferencer {
    model:  TextClassifier<InferBackend>,
    config: TextClassifierConfig,
    device: <InferBackend as Backend>::Device,
}

impl Inferencer {
    pub fn new(model: TextClassifier<InferBackend>, config: TextClassifierConfig) -> Self {
        Self { model, config, device: Default::default() }
    }

    pub fn config(&self) -> &TextClassifierConfig {
        &self.config
    }
}

impl Classifier for Inferencer {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn max_len(&self) -> usize {
        self.config.max_len
    }

    fn predict_proba(&self, token_ids: &[u32]) -> Result<Vec<f32>> {
        let seq_len = self.config.max_len;
        if token_ids.len() != seq_len {
            return Err(PipelineError::InvalidConfig(format!(
                "expected {seq_len} token ids, got {}",
                token_ids.len()
            )));
        }

        // Out-of-range ids would index past the embedding table
        let ids: Vec<i32> = token_ids
            .iter()
            .map(|&id| {
                let id = if (id as usize) < self.config.vocab_size { id } else { OOV_ID };
                id as i32
            })
            .collect();
        let mask: Vec<f32> = token_ids
            .iter()
            .map(|&id| if id == PAD_ID { 0.0 } else { 1.0 })
            .collect();

        let input_ids = Tensor::<InferBackend, 1, Int>::from_ints(ids.as_slice(), &self.device)
            .reshape([1, seq_len]);
        let mask = Tensor::<InferBackend, 1>::from_floats(mask.as_slice(), &self.device)
            .reshape([1, seq_len]);

        let probs = self.model.probabilities(input_ids, mask).reshape([self.config.num_classes]);
        probs
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PipelineError::Serialization(format!("cannot read probabilities: {e:?}")))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::quantize::{probe_inputs, QuantizedModel};

    fn inferencer() -> Inferencer {
        let config = TextClassifierConfig::new(6, 3, 4).with_embed_dim(5).with_hidden_dim(4);
        let model = config.init::<InferBackend>(3, &Default::default());
        Inferencer::new(model, config)
    }

    #[test]
    fn test_probabilities_form_a_distribution() {
        let inf = inferencer();
        let probs = inf.predict_proba(&[2, 3, 0, 0]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_out_of_range_ids_fall_back_to_oov() {
        let inf = inferencer();
        assert_eq!(
            inf.predict_proba(&[99, 0, 0, 0]).unwrap(),
            inf.predict_proba(&[1, 0, 0, 0]).unwrap()
        );
    }

    #[test]
    fn test_quantized_export_tracks_float_model() {
        let inf = inferencer();
        let weights = inf.model.to_weights().unwrap();
        let quantized = QuantizedModel::from_weights(inf.config(), &weights, "digest").unwrap();

        for probe in probe_inputs(inf.config()) {
            let float = inf.predict_proba(&probe).unwrap();
            let quant = quantized.predict_proba(&probe).unwrap();
            for (f, q) in float.iter().zip(&quant) {
                assert!((f - q).abs() < 0.02);
            }
        }
    }
}
