// ============================================================
// Layer 4 - Encoded Dataset
// ============================================================
// Tokenised, padded samples ready for the batcher. Implements
// Burn's Dataset trait so the DataLoader can index into them.

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::encoder::{LabelEncoder, Vocabulary};
use crate::domain::sample::SampleSet;
use crate::error::{PipelineError, Result};

// ─── EncodedSample ────────────────────────────────────────────────────────────

/// One fully tokenised and padded training sample.
/// Sequence format: word ids then [PAD]... up to max_len.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub label:          u32,
}

impl EncodedSample {
    /// Number of real (non-padding) tokens.
    pub fn token_count(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// Encode every sample of `samples` against the fitted tables.
pub fn encode_samples(
    samples:    &SampleSet,
    vocabulary: &Vocabulary,
    labels:     &LabelEncoder,
) -> Result<Vec<EncodedSample>> {
    samples
        .iter()
        .map(|sample| {
            let label = labels.id(&sample.label).ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "label '{}' is not known to the label encoder",
                    sample.label
                ))
            })?;
            let encoded = vocabulary.encode(&sample.text)?;
            Ok(EncodedSample {
                input_ids:      encoded.input_ids,
                attention_mask: encoded.attention_mask,
                label,
            })
        })
        .collect()
}

// ─── EncodedDataset ───────────────────────────────────────────────────────────

pub struct EncodedDataset {
    samples: Vec<EncodedSample>,
}

impl EncodedDataset {
    pub fn new(samples: Vec<EncodedSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    pub fn as_slice(&self) -> &[EncodedSample] { &self.samples }
}

impl Dataset<EncodedSample> for EncodedDataset {
    fn get(&self, index: usize) -> Option<EncodedSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
