// ============================================================
// Layer 5 - Text Classifier Model
// ============================================================
// A small bag-of-embeddings classifier:
//
//   input_ids [batch, seq]
//       │  embedding lookup              [vocab, embed]
//       ▼
//   [batch, seq, embed]
//       │  masked mean over seq          (padding id 0 ignored)
//       ▼
//   [batch, embed]
//       │  dense + ReLU                  [embed, hidden]
//       ▼
//   [batch, hidden]
//       │  dense                         [hidden, classes]
//       ▼
//   logits [batch, classes]
//
// Parameters are plain `Param<Tensor>` fields so the same
// matrices can be read back row by row for int8 export.
// Initial values come from a seeded StdRng, which makes a
// training run reproducible without touching the backend seed.

use burn::{
    module::Param,
    nn::loss::CrossEntropyLoss,
    prelude::*,
    tensor::{activation, backend::AutodiffBackend, TensorData},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::PipelineError;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct TextClassifierConfig {
    pub vocab_size:  usize,
    pub num_classes: usize,
    pub max_len:     usize,
    #[config(default = 64)]
    pub embed_dim:   usize,
    #[config(default = 64)]
    pub hidden_dim:  usize,
}

impl TextClassifierConfig {
    /// Total number of trainable scalars.
    pub fn num_params(&self) -> usize {
        self.vocab_size * self.embed_dim
            + self.embed_dim * self.hidden_dim
            + self.hidden_dim
            + self.hidden_dim * self.num_classes
            + self.num_classes
    }

    pub fn init<B: Backend>(&self, seed: u64, device: &B::Device) -> TextClassifier<B> {
        let mut rng = StdRng::seed_from_u64(seed);

        // Keras-style defaults: small uniform embeddings, Glorot-uniform dense
        // kernels, zero biases.
        let embedding = uniform_param(&mut rng, [self.vocab_size, self.embed_dim], 0.05, device);
        let hidden_weight = uniform_param(
            &mut rng,
            [self.embed_dim, self.hidden_dim],
            glorot_limit(self.embed_dim, self.hidden_dim),
            device,
        );
        let output_weight = uniform_param(
            &mut rng,
            [self.hidden_dim, self.num_classes],
            glorot_limit(self.hidden_dim, self.num_classes),
            device,
        );

        TextClassifier {
            embedding,
            hidden_weight,
            hidden_bias: Param::from_tensor(Tensor::zeros([self.hidden_dim], device)),
            output_weight,
            output_bias: Param::from_tensor(Tensor::zeros([self.num_classes], device)),
        }
    }
}

fn glorot_limit(fan_in: usize, fan_out: usize) -> f32 {
    (6.0 / (fan_in + fan_out).max(1) as f32).sqrt()
}

fn uniform_param<B: Backend, const D: usize>(
    rng:    &mut StdRng,
    shape:  [usize; D],
    limit:  f32,
    device: &B::Device,
) -> Param<Tensor<B, D>> {
    let count: usize = shape.iter().product();
    let values: Vec<f32> = (0..count).map(|_| rng.gen_range(-limit..limit)).collect();
    Param::from_tensor(Tensor::from_data(TensorData::new(values, shape), device))
}

#[derive(Module, Debug)]
pub struct TextClassifier<B: Backend> {
    pub embedding:     Param<Tensor<B, 2>>,
    pub hidden_weight: Param<Tensor<B, 2>>,
    pub hidden_bias:   Param<Tensor<B, 1>>,
    pub output_weight: Param<Tensor<B, 2>>,
    pub output_bias:   Param<Tensor<B, 1>>,
}

pub struct ClassificationOutput<B: Backend> {
    pub loss:    Tensor<B, 1>,
    pub logits:  Tensor<B, 2>,
}

impl<B: Backend> TextClassifier<B> {
    /// input_ids: [batch, seq], mask: [batch, seq] → logits: [batch, classes]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input_ids.dims();
        let [_, embed_dim] = self.embedding.val().dims();

        let embedded = self
            .embedding
            .val()
            .select(0, input_ids.reshape([batch_size * seq_len]))
            .reshape([batch_size, seq_len, embed_dim]);

        // Masked mean: padding rows contribute nothing, and an all-padding
        // row pools to zeros instead of dividing by zero.
        let summed = (embedded * mask.clone().reshape([batch_size, seq_len, 1]))
            .sum_dim(1)
            .reshape([batch_size, embed_dim]);
        let counts = mask.sum_dim(1).clamp_min(1.0);
        let pooled = summed / counts;

        let hidden = activation::relu(
            pooled.matmul(self.hidden_weight.val()) + self.hidden_bias.val().unsqueeze::<2>(),
        );
        hidden.matmul(self.output_weight.val()) + self.output_bias.val().unsqueeze::<2>()
    }

    /// Class probabilities: softmax over the logits.
    pub fn probabilities(&self, input_ids: Tensor<B, 2, Int>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        activation::softmax(self.forward(input_ids, mask), 1)
    }

    pub fn forward_classification(
        &self,
        input_ids: Tensor<B, 2, Int>,
        mask:      Tensor<B, 2>,
        labels:    Tensor<B, 1, Int>,
        loss_fn:   &CrossEntropyLoss<B>,
    ) -> ClassificationOutput<B>
    where
        B: AutodiffBackend,
    {
        let logits = self.forward(input_ids, mask);
        let loss = loss_fn.forward(logits.clone(), labels);
        ClassificationOutput { loss, logits }
    }

    /// Copy every parameter out as row-major f32 values.
    pub fn to_weights(&self) -> crate::error::Result<FloatWeights> {
        Ok(FloatWeights {
            embedding:     tensor_values(self.embedding.val())?,
            hidden_weight: tensor_values(self.hidden_weight.val())?,
            hidden_bias:   tensor_values(self.hidden_bias.val())?,
            output_weight: tensor_values(self.output_weight.val())?,
            output_bias:   tensor_values(self.output_bias.val())?,
        })
    }
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> crate::error::Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| PipelineError::Serialization(format!("cannot read tensor values: {e:?}")))
}

/// Row-major parameter values, shaped by the owning TextClassifierConfig.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatWeights {
    pub embedding:     Vec<f32>,
    pub hidden_weight: Vec<f32>,
    pub hidden_bias:   Vec<f32>,
    pub output_weight: Vec<f32>,
    pub output_bias:   Vec<f32>,
}
