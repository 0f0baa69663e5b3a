// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn framework specific code.
// Only the batcher in Layer 4 also builds tensors.
//
// What's in this layer:
//
//   model.rs      - The text classifier
//                   • Token embeddings (padding masked out)
//                   • Masked mean pooling
//                   • Dense + ReLU hidden layer
//                   • Dense logits head
//
//   trainer.rs    - The training loop
//                   Forward pass, class-weighted loss, backward
//                   pass, Adam step, validation, early stopping,
//                   cancellation and divergence checks
//
//   inferencer.rs - Float runtime behind the Classifier trait
//
//   quantize.rs   - Int8 export, its binary container, and the
//                   pure-Rust runtime used to verify it

/// Embedding-bag text classifier
pub mod model;

/// Full training loop with validation and early stopping
pub mod trainer;

/// Float inference over a trained model
pub mod inferencer;

/// Int8 quantized export and verification
pub mod quantize;
