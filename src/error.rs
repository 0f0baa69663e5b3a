// ============================================================
// Error Taxonomy
// ============================================================
// Every failure the pipeline can surface to a caller.
// Each variant maps onto one `ErrorKind` so a GUI or script can
// pick a specific remediation message instead of a generic one.
//
// The binary wraps these in anyhow at the very edge; inside the
// library everything returns `Result<T>` from this module.

use std::fmt;

use thiserror::Error;

use crate::domain::format::Format;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Line/column position inside a source document (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors that can occur anywhere in the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The document is not syntactically valid for its format.
    #[error("{format} parse error{}: {message}", fmt_location(.location))]
    Parse {
        format: Format,
        message: String,
        location: Option<Location>,
    },

    /// The document parsed but carries no usable training data.
    #[error("{format} schema error: {message}")]
    Schema { format: Format, message: String },

    /// Dataset construction produced zero samples.
    #[error("dataset is empty ({skipped} malformed records skipped)")]
    EmptyDataset { skipped: usize },

    /// Classification needs at least two classes.
    #[error("at least 2 distinct labels are required, found {found}")]
    InsufficientLabels { found: usize },

    /// A training option is unknown or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loss became NaN or infinite.
    #[error("training diverged at epoch {epoch}: loss = {loss}")]
    TrainingDiverged { epoch: usize, loss: f64 },

    /// The run would exceed a resource limit, or a worker could not start.
    #[error("resource error: {0}")]
    Resource(String),

    /// A cancellation request was observed; nothing was published.
    #[error("training cancelled")]
    Cancelled,

    /// Conversion was requested before any model was trained.
    #[error("no trained model in namespace '{namespace}'")]
    MissingModel { namespace: String },

    /// The exported artifact failed its post-conversion sanity check.
    #[error("conversion verification failed: {0}")]
    ConversionVerification(String),

    /// A requested artifact has never been published.
    #[error("artifact '{kind}' not found in namespace '{namespace}'")]
    ArtifactNotFound { namespace: String, kind: String },

    /// Two co-versioned artifacts do not belong to the same run.
    #[error("artifact '{kind}' in namespace '{namespace}' does not match the trained model")]
    StaleArtifact { namespace: String, kind: String },

    /// A persisted artifact could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_location(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

/// Field-less discriminant of `PipelineError` for caller dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Schema,
    EmptyDataset,
    InsufficientLabels,
    InvalidConfig,
    TrainingDiverged,
    Resource,
    Cancelled,
    MissingModel,
    ConversionVerification,
    ArtifactNotFound,
    StaleArtifact,
    Serialization,
    Io,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::EmptyDataset { .. } => ErrorKind::EmptyDataset,
            Self::InsufficientLabels { .. } => ErrorKind::InsufficientLabels,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::TrainingDiverged { .. } => ErrorKind::TrainingDiverged,
            Self::Resource(_) => ErrorKind::Resource,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::MissingModel { .. } => ErrorKind::MissingModel,
            Self::ConversionVerification(_) => ErrorKind::ConversionVerification,
            Self::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            Self::StaleArtifact { .. } => ErrorKind::StaleArtifact,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// A short hint a front end can show next to the error message.
    pub fn remediation(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Parse => "Fix the syntax error in the input file and try again.",
            ErrorKind::Schema => {
                "Each entry needs a label and at least one phrasing string."
            }
            ErrorKind::EmptyDataset => "The document produced no usable phrasings.",
            ErrorKind::InsufficientLabels => "Add at least two different labels.",
            ErrorKind::InvalidConfig => "Check the training options.",
            ErrorKind::TrainingDiverged => "Lower the learning rate and retrain.",
            ErrorKind::Resource => "Reduce the vocabulary or model size.",
            ErrorKind::Cancelled => "Training was cancelled; previous artifacts are untouched.",
            ErrorKind::MissingModel => "Train a model for this format before converting.",
            ErrorKind::ConversionVerification => "Retrain the model and convert again.",
            ErrorKind::ArtifactNotFound => "Run the stage that produces this artifact first.",
            ErrorKind::StaleArtifact => "Retrain to regenerate a consistent artifact set.",
            ErrorKind::Serialization => "The artifact is corrupted; retrain to regenerate it.",
            ErrorKind::Io => "Check file permissions and free disk space.",
        }
    }
}
