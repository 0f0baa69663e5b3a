// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// This layer handles everything from a raw document all the way
// to CPU tensor batches.
//
// The pipeline flows in this order:
//
//   JSON / TOML / YAML document
//       │
//       ▼
//   interpreter   → parses and validates, canonical schema
//       │
//       ▼
//   builder       → one (text, label) sample per phrasing
//       │            (uses preprocessor for normalisation)
//       ▼
//   encoder       → label encoder + word vocabulary
//       │
//       ▼
//   splitter      → seeded train/validation split
//       │
//       ▼
//   dataset       → padded ids, implements Burn's Dataset trait
//       │
//       ▼
//   batcher       → stacks samples into tensor batches
//
// Each module is responsible for exactly one step.

/// Format-specific parsers behind one canonical schema
pub mod interpreter;

/// The single text normalisation policy
pub mod preprocessor;

/// Canonical schema → ordered SampleSet
pub mod builder;

/// Vocabulary and label encoder fitting
pub mod encoder;

/// Encoded samples, implements Burn's Dataset trait
pub mod dataset;

/// Creates tensor batches from encoded samples
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
