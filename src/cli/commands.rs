// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags:
//
//   train    - document → published artifact set (+ optional int8)
//   convert  - published model → int8 export
//   classify - top-k labels for a query
//   status   - which artifacts a namespace holds
//   export   - copy an artifact out of the store
//   clear    - delete a namespace's artifacts
//   check    - compare document labels with a trained model
//
// Training flags are all optional: unset flags fall back to the
// --options file, then to the built-in defaults.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::classify_use_case::Runtime;
use crate::data::builder::{DuplicatePolicy, MalformedPolicy};
use crate::domain::format::Format;
use crate::infra::artifact_store::ArtifactKind;
use crate::ml::trainer::TrainingOptions;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier from a JSON, TOML or YAML document
    Train(TrainArgs),

    /// Export the trained model of a namespace as int8
    Convert(NamespaceArgs),

    /// Print the most likely labels for a query
    Classify(ClassifyArgs),

    /// Show which artifacts a namespace holds
    Status(StatusArgs),

    /// Copy an artifact out of the store
    Export(ExportArgs),

    /// Delete every artifact of a namespace
    Clear(NamespaceArgs),

    /// Compare a document's labels with the trained model's
    Check(CheckArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// The document to train on
    pub document: PathBuf,

    /// Document format; defaults to the file extension
    #[arg(long)]
    pub format: Option<Format>,

    /// Training options file (.json, .toml, .yaml)
    #[arg(long)]
    pub options: Option<PathBuf>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Fraction of samples held out for validation, in [0, 1)
    #[arg(long)]
    pub validation_split: Option<f64>,

    /// Stop once validation loss stops improving
    #[arg(long)]
    pub early_stopping: bool,

    #[arg(long)]
    pub patience: Option<usize>,

    #[arg(long)]
    pub lr: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub embed_dim: Option<usize>,

    #[arg(long)]
    pub hidden_dim: Option<usize>,

    /// Train with an unweighted loss
    #[arg(long)]
    pub no_class_weights: bool,

    /// Observed-word cap of the vocabulary
    #[arg(long)]
    pub max_vocabulary: Option<usize>,

    /// Longest token sequence the model sees
    #[arg(long)]
    pub max_sequence_length: Option<usize>,

    /// Keep letter case
    #[arg(long)]
    pub keep_case: bool,

    /// Keep punctuation
    #[arg(long)]
    pub keep_punctuation: bool,

    /// Stop at the first malformed record instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// keep, warn or drop repeated phrasings
    #[arg(long, default_value = "keep", value_parser = parse_duplicates)]
    pub duplicates: DuplicatePolicy,

    /// Also write the int8 export
    #[arg(long)]
    pub convert: bool,
}

impl TrainArgs {
    /// Overlay the flags that were given onto `base`.
    pub fn apply_overrides(&self, base: TrainingOptions) -> TrainingOptions {
        TrainingOptions {
            epochs:           self.epochs.unwrap_or(base.epochs),
            batch_size:       self.batch_size.unwrap_or(base.batch_size),
            validation_split: self.validation_split.unwrap_or(base.validation_split),
            early_stopping:   self.early_stopping || base.early_stopping,
            patience:         self.patience.unwrap_or(base.patience),
            learning_rate:    self.lr.unwrap_or(base.learning_rate),
            seed:             self.seed.unwrap_or(base.seed),
            embed_dim:        self.embed_dim.unwrap_or(base.embed_dim),
            hidden_dim:       self.hidden_dim.unwrap_or(base.hidden_dim),
            class_weighting:  base.class_weighting && !self.no_class_weights,
            max_parameters:   base.max_parameters,
        }
    }

    pub fn malformed_policy(&self) -> MalformedPolicy {
        if self.strict { MalformedPolicy::Fail } else { MalformedPolicy::Skip }
    }
}

fn parse_duplicates(s: &str) -> Result<DuplicatePolicy, String> {
    match s.to_ascii_lowercase().as_str() {
        "keep" => Ok(DuplicatePolicy::Keep),
        "warn" => Ok(DuplicatePolicy::Warn),
        "drop" => Ok(DuplicatePolicy::Drop),
        other => Err(format!("unknown duplicate policy '{other}' (expected keep, warn or drop)")),
    }
}

fn parse_artifact(s: &str) -> Result<ArtifactKind, String> {
    ArtifactKind::ALL
        .into_iter()
        .find(|k| {
            let name = k.file_name();
            name == s || name.split('.').next() == Some(s)
        })
        .or(match s {
            "q8" | "quantized" => Some(ArtifactKind::QuantizedModel),
            "labels" => Some(ArtifactKind::LabelEncoder),
            "weights" | "model" => Some(ArtifactKind::ModelWeights),
            "manifest" => Some(ArtifactKind::ModelManifest),
            _ => None,
        })
        .ok_or_else(|| format!("unknown artifact '{s}'"))
}

/// Arguments for commands that only need a namespace.
#[derive(Args, Debug)]
pub struct NamespaceArgs {
    /// json, toml or yaml
    #[arg(long)]
    pub format: Format,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// The text to classify
    pub query: String,

    #[arg(long)]
    pub format: Format,

    /// float or quantized
    #[arg(long, default_value = "float")]
    pub runtime: Runtime,

    /// How many labels to print
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// A single namespace; all three when omitted
    #[arg(long)]
    pub format: Option<Format>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(long)]
    pub format: Format,

    /// Destination file or directory
    #[arg(long)]
    pub to: PathBuf,

    /// Which artifact, e.g. q8, tokenizer, labels, manifest
    #[arg(long, default_value = "q8", value_parser = parse_artifact)]
    pub artifact: ArtifactKind,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// The document whose labels to compare
    pub document: PathBuf,

    /// Document format; defaults to the file extension
    #[arg(long)]
    pub format: Option<Format>,
}
