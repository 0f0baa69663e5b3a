// ============================================================
// Layer 4 - Classifier Batcher
// ============================================================
// Converts a slice of EncodedSamples into backend tensors.
//
// How batching works here:
//   Input:  N EncodedSamples, each padded to length S
//   Output: ClassifierBatch with tensors of shape [N, S] / [N]
//
//   All input_ids are flattened into one long Vec, then reshaped:
//   [s1_t1, s1_t2, ..., s1_tS, s2_t1, ..., sN_tS] → [N, S]
//
// The attention mask is produced as a float tensor because the
// model multiplies it straight into the embeddings for masked
// mean pooling.
//
// The trainer drives batching itself (seeded shuffle of indices,
// then one `batch` call per chunk), so this is a plain struct
// rather than a DataLoader batcher.

use burn::prelude::*;

use crate::data::dataset::EncodedSample;

// ─── ClassifierBatch ──────────────────────────────────────────────────────────
/// A batch of encoded samples ready for the model forward pass.
/// All tensors have batch_size as their first dimension.
#[derive(Debug, Clone)]
pub struct ClassifierBatch<B: Backend> {
    /// Token ID sequences - shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1.0 = real token, 0.0 = padding - shape: [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2>,

    /// Class ids - shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

// ─── ClassifierBatcher ────────────────────────────────────────────────────────
/// Holds the target device so tensors are created in the right place.
#[derive(Clone, Debug)]
pub struct ClassifierBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClassifierBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack `items` into one batch. `items` must be non-empty and
    /// share one sequence length.
    pub fn batch(&self, items: &[&EncodedSample]) -> ClassifierBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|s| s.input_ids.len()).unwrap_or(0);

        // Burn Int tensors are i32 on the NdArray backend
        let input_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();

        let mask_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as f32))
            .collect();

        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let input_ids = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        let attention_mask = Tensor::<B, 1>::from_floats(mask_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        ClassifierBatch {
            input_ids,
            attention_mask,
            labels,
        }
    }
}
