// ============================================================
// suggest-lite
// ============================================================
// Trains a small text classifier from a JSON, TOML or YAML
// question document and exports it as an int8 model.
//
//   Layer 1 - cli          clap front end (binary only)
//   Layer 2 - application  use cases: train, convert, classify, ...
//   Layer 3 - domain       formats, canonical schema, samples, traits
//   Layer 4 - data         interpreters, dataset builder, encoders
//   Layer 5 - ml           Burn model, trainer, int8 export
//   Layer 6 - infra        artifact store and persistence

#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ml;

pub use error::{ErrorKind, PipelineError, Result};
