// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Persistence concerns shared by the use cases:
//
//   artifact_store.rs  - Per-format artifact namespaces
//                        Atomic publish through a staging
//                        directory, per-namespace locking,
//                        export and clear.
//
//   tokenizer_store.rs - Vocabulary and label encoder files
//                        Saved as tokenizer.json and
//                        label_encoder.json, reloaded only when
//                        their digests match the manifest.
//
//   checkpoint.rs      - Model weights and manifest
//                        Uses Burn's NamedMpkBytesRecorder for the
//                        parameters and a JSON manifest so the
//                        model can be rebuilt before loading.
//
//   metrics.rs         - Per-epoch training metrics
//                        Rendered as metrics.csv for later
//                        analysis and plotting.

/// Namespaced, atomically published artifact files
pub mod artifact_store;

/// Tokenizer and label encoder persistence
pub mod tokenizer_store;

/// Model weights and manifest persistence
pub mod checkpoint;

/// Training metrics CSV
pub mod metrics;
