// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Interpret the document     (Layer 4 - data)
//   Step 2: Build the sample set       (Layer 4 - data)
//   Step 3: Fit labels + vocabulary    (Layer 4 - data)
//   Step 4: Lock the namespace         (Layer 6 - infra)
//   Step 5: Run the training loop      (Layer 5 - ml)
//   Step 6: Publish the artifact set   (Layer 6 - infra)
//   Step 7: Optionally convert to int8 (Layer 2 - convert)
//
// Progress reported on the channel:
//
//   0 start │ 5 interpreted │ 10 built │ 15 fitted │ 20..85 epochs
//   95 published │ 100 done
//
// Nothing is written until training has succeeded, and the five
// files are then published as one set, so a failed or cancelled run
// leaves the previous artifacts exactly as they were.

use std::{
    path::PathBuf,
    thread::{self, JoinHandle},
};

use serde::{Deserialize, Serialize};

use crate::application::convert_use_case::{ConversionReport, ConvertUseCase};
use crate::data::{
    builder::{DatasetBuilder, DatasetOptions, DatasetWarning},
    encoder::{fit, TokenizerOptions},
    interpreter::{interpret, interpret_path},
};
use crate::domain::{
    document::ConfigDocument,
    format::Format,
    progress::{CancellationToken, ProgressChannel},
};
use crate::error::{PipelineError, Result};
use crate::infra::{
    artifact_store::{ArtifactKind, ArtifactStore},
    checkpoint::EncodedModel,
    metrics::metrics_csv,
    tokenizer_store::EncodedEncoders,
};
use crate::ml::trainer::{TrainReport, Trainer, TrainingOptions};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run needs besides the document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub artifacts_dir: PathBuf,
    pub dataset:       DatasetOptions,
    pub tokenizer:     TokenizerOptions,
    pub training:      TrainingOptions,
    /// Also produce the int8 export after publishing
    pub convert:       bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("generated"),
            dataset:       DatasetOptions::default(),
            tokenizer:     TokenizerOptions::default(),
            training:      TrainingOptions::default(),
            convert:       false,
        }
    }
}

/// Where the training document comes from.
#[derive(Debug, Clone)]
pub enum TrainInput {
    /// A file on disk; the format defaults to the extension's.
    File { path: PathBuf, format: Option<Format> },
    /// Document text already in memory.
    Inline { format: Format, raw: String },
}

impl TrainInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        TrainInput::File { path: path.into(), format: None }
    }

    pub fn inline(format: Format, raw: impl Into<String>) -> Self {
        TrainInput::Inline { format, raw: raw.into() }
    }

    fn interpret(&self) -> Result<ConfigDocument> {
        match self {
            TrainInput::File { path, format } => interpret_path(path, *format),
            TrainInput::Inline { format, raw } => interpret(*format, raw),
        }
    }
}

/// Everything a finished run reports back.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub namespace:        String,
    /// Samples the model was trained on
    pub items_serialized: usize,
    pub warnings:         Vec<DatasetWarning>,
    pub labels:           Vec<String>,
    pub vocabulary_size:  usize,
    pub report:           TrainReport,
    /// Published files, in publish order
    pub artifacts:        Vec<PathBuf>,
    pub conversion:       Option<ConversionReport>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    store:  ArtifactStore,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        let store = ArtifactStore::new(config.artifacts_dir.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Execute the full pipeline end to end.
    pub fn execute(
        &self,
        input:   &TrainInput,
        channel: &mut ProgressChannel,
        cancel:  &CancellationToken,
    ) -> Result<TrainSummary> {
        let cfg = &self.config;
        channel.progress(0);

        // Options are checked before any document is read
        let trainer = Trainer::new(cfg.training.clone())?.with_progress_span(20, 85);
        let tokenizer_options = TokenizerOptions {
            normalization: cfg.dataset.normalization,
            ..cfg.tokenizer
        };
        tokenizer_options.validate()?;

        // ── Step 1: Interpret ────────────────────────────────────────────────
        let document = input.interpret()?;
        channel.log(format!(
            "Read {} entries from {} document",
            document.entries.len(),
            document.format
        ));
        channel.progress(5);

        // ── Step 2: Build samples ────────────────────────────────────────────
        let build = DatasetBuilder::new(cfg.dataset).build(&document)?;
        if !build.warnings.is_empty() {
            channel.log(format!("Skipped or flagged {} records", build.warnings.len()));
        }
        channel.log(format!("Built {} samples", build.samples.len()));
        channel.progress(10);

        // ── Step 3: Fit encoders ─────────────────────────────────────────────
        let (vocabulary, labels) = fit(&build.samples, &tokenizer_options)?;
        channel.log(format!(
            "Fitted {} labels and {} vocabulary entries (max_len={})",
            labels.len(),
            vocabulary.len(),
            vocabulary.max_len()
        ));
        channel.progress(15);

        // ── Step 4: Lock the namespace ───────────────────────────────────────
        let namespace = self.store.namespace(document.format);
        let _lock = self.store.lock(&namespace);

        // ── Step 5: Train ────────────────────────────────────────────────────
        let (trained, report) = trainer.train(&build.samples, &vocabulary, &labels, channel, cancel)?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // ── Step 6: Publish ──────────────────────────────────────────────────
        // One set: a failed write leaves the previous run's files in place
        let encoders = EncodedEncoders::new(&vocabulary, &labels)?;
        let model = EncodedModel::new(
            &trained,
            vocabulary.normalization(),
            encoders.vocabulary_digest.clone(),
            encoders.labels_digest.clone(),
        )?;
        let mut set = Vec::with_capacity(5);
        set.extend(encoders.into_artifacts());
        set.extend(model.into_artifacts());
        set.push((ArtifactKind::Metrics, metrics_csv(&report.metrics)));

        let mut artifacts = self.store.publish_set(&namespace, &set)?;
        tracing::info!(
            "Saved tokenizer ({} tokens), {} labels and model ({} parameters) to '{}'",
            vocabulary.len(),
            labels.len(),
            trained.config.num_params(),
            namespace.dir().display()
        );
        channel.log(format!("Published artifacts to '{}'", namespace.dir().display()));
        channel.progress(95);

        // ── Step 7: Convert ──────────────────────────────────────────────────
        let conversion = if cfg.convert {
            let converted = ConvertUseCase::new(self.store.clone()).convert_unlocked(&namespace)?;
            channel.log(format!("Exported int8 model ({} bytes)", converted.bytes));
            artifacts.push(converted.path.clone());
            Some(converted)
        } else {
            None
        };

        channel.progress(100);
        tracing::info!(
            "Training pipeline for '{}' finished: {} samples, {} epochs",
            namespace.name(),
            build.samples.len(),
            report.epochs_run
        );

        Ok(TrainSummary {
            namespace: namespace.name().to_string(),
            items_serialized: build.samples.len(),
            warnings: build.warnings,
            labels: labels.labels().map(str::to_string).collect(),
            vocabulary_size: vocabulary.len(),
            report,
            artifacts,
            conversion,
        })
    }
}

// ─── TrainingJob ──────────────────────────────────────────────────────────────
// Runs a TrainUseCase on a named background thread so a caller's
// event loop stays responsive. Progress arrives through the
// channel the job was spawned with.
pub struct TrainingJob {
    cancel: CancellationToken,
    handle: JoinHandle<Result<TrainSummary>>,
}

impl TrainingJob {
    pub fn spawn(config: TrainConfig, input: TrainInput, mut channel: ProgressChannel) -> Result<Self> {
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("suggest-lite-train".to_string())
            .spawn(move || TrainUseCase::new(config).execute(&input, &mut channel, &worker_cancel))
            .map_err(|e| PipelineError::Resource(format!("cannot start training thread: {e}")))?;
        Ok(Self { cancel, handle })
    }

    /// Ask the worker to stop at its next batch boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its result.
    pub fn join(self) -> Result<TrainSummary> {
        self.handle
            .join()
            .map_err(|_| PipelineError::Resource("training thread panicked".to_string()))?
    }
}
