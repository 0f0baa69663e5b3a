// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts of
// the system. No Burn types, no file I/O, no tokenizer code.
//
//   format.rs   - the three input formats / artifact namespaces
//   document.rs - the canonical schema every interpreter produces
//   sample.rs   - (text, label) samples and ordered sample sets
//   progress.rs - progress/log observer channel and cancellation
//   traits.rs   - interpreter and classifier abstractions

pub mod document;
pub mod format;
pub mod progress;
pub mod sample;
pub mod traits;
