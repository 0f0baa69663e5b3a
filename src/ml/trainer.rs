// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Full train + validation loop with Adam on the CPU backend.
//
// Key Burn insight:
//   - Training uses TrainBackend (Autodiff<NdArray>) for gradients
//   - model.valid() returns the model on InferBackend (NdArray)
//   - Validation batcher must also use InferBackend
//   - argmax(1) returns [batch,1] so we flatten before .equal()
//
// Reproducibility:
//   - Weights are initialised from StdRng(seed)
//   - The validation split and every epoch's batch order come
//     from StdRng(seed) as well
//   - NdArray is a CPU backend, so the only remaining source of
//     drift is float reduction order inside matmul
//
// The loop polls the CancellationToken before it starts and at
// every batch boundary. A non-finite batch loss aborts the run
// with TrainingDiverged; nothing is returned, so nothing is
// published.

use std::path::Path;

use burn::{
    backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    },
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::ClassifierBatcher,
    dataset::{encode_samples, EncodedDataset, EncodedSample},
    encoder::{LabelEncoder, Vocabulary},
    splitter::split_train_val,
};
use crate::domain::{
    format::Format,
    progress::{CancellationToken, ProgressChannel},
    sample::SampleSet,
};
use crate::error::{PipelineError, Result};
use crate::infra::metrics::EpochMetrics;
use crate::ml::model::{TextClassifier, TextClassifierConfig};

pub type TrainBackend = Autodiff<NdArray>;
pub type InferBackend = NdArray;

// ─── Training Options ─────────────────────────────────────────────────────────
// Every knob the trainer accepts. Unknown keys are rejected so a
// typo in an options file fails loudly instead of being ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingOptions {
    pub epochs:           usize,
    pub batch_size:       usize,
    /// Fraction of samples held out, in [0, 1)
    pub validation_split: f64,
    pub early_stopping:   bool,
    /// Epochs without improvement before early stopping fires
    pub patience:         usize,
    pub learning_rate:    f64,
    pub seed:             u64,
    pub embed_dim:        usize,
    pub hidden_dim:       usize,
    /// Weight the loss so every class counts equally
    pub class_weighting:  bool,
    /// Refuse to build a model larger than this
    pub max_parameters:   usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs:           12,
            batch_size:       32,
            validation_split: 0.1,
            early_stopping:   false,
            patience:         3,
            learning_rate:    1e-3,
            seed:             42,
            embed_dim:        64,
            hidden_dim:       64,
            class_weighting:  true,
            max_parameters:   50_000_000,
        }
    }
}

impl TrainingOptions {
    /// Parse options written in any of the supported document formats.
    pub fn from_document(format: Format, raw: &str) -> Result<Self> {
        let parsed = match format {
            Format::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(raw).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        };
        let options: Self = parsed
            .map_err(|e| PipelineError::InvalidConfig(format!("training options ({format}): {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Read an options file, choosing the format from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::from_path(path).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "options file '{}' must end in .json, .toml, .yaml or .yml",
                path.display()
            ))
        })?;
        let raw = std::fs::read_to_string(path)?;
        Self::from_document(format, &raw)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.epochs == 0 {
            return invalid("epochs must be at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return invalid("validation_split must be in [0, 1)");
        }
        if self.patience == 0 {
            return invalid("patience must be at least 1");
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return invalid("learning_rate must be a positive finite number");
        }
        if self.embed_dim == 0 || self.hidden_dim == 0 {
            return invalid("embed_dim and hidden_dim must be at least 1");
        }
        if self.max_parameters == 0 {
            return invalid("max_parameters must be at least 1");
        }
        Ok(())
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

/// The fitted classifier plus what is needed to rebuild it.
pub struct TrainedModel {
    pub model:      TextClassifier<InferBackend>,
    pub config:     TextClassifierConfig,
    pub seed:       u64,
    pub epochs_run: usize,
}

/// Summary of one training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub epochs_run:         usize,
    pub best_epoch:         usize,
    pub stopped_early:      bool,
    pub train_samples:      usize,
    pub validation_samples: usize,
    pub parameters:         usize,
    pub metrics:            Vec<EpochMetrics>,
}

impl TrainReport {
    pub fn final_metrics(&self) -> Option<&EpochMetrics> {
        self.metrics.last()
    }
}

// ─── Early Stopping ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoppingDecision {
    NewBest,
    NoImprovement,
    Stop,
}

#[derive(Debug)]
struct EarlyStopping {
    patience:   usize,
    best:       f64,
    best_epoch: usize,
    counter:    usize,
}

impl EarlyStopping {
    fn new(patience: usize) -> Self {
        Self { patience, best: f64::INFINITY, best_epoch: 0, counter: 0 }
    }

    fn check(&mut self, epoch: usize, metrics: &EpochMetrics) -> StoppingDecision {
        if metrics.is_improvement(self.best) {
            self.best = metrics.monitored_loss();
            self.best_epoch = epoch;
            self.counter = 0;
            StoppingDecision::NewBest
        } else {
            self.counter += 1;
            if self.counter >= self.patience {
                StoppingDecision::Stop
            } else {
                StoppingDecision::NoImprovement
            }
        }
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────

pub struct Trainer {
    options:       TrainingOptions,
    progress_span: (u8, u8),
    device:        NdArrayDevice,
}

impl Trainer {
    /// Validates `options` before anything else happens.
    pub fn new(options: TrainingOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            progress_span: (0, 100),
            device: NdArrayDevice::default(),
        })
    }

    /// Map epoch progress into `[start, end]` instead of `[0, 100]`.
    pub fn with_progress_span(mut self, start: u8, end: u8) -> Self {
        let start = start.min(100);
        self.progress_span = (start, end.clamp(start, 100));
        self
    }

    pub fn options(&self) -> &TrainingOptions {
        &self.options
    }

    pub fn train(
        &self,
        samples:    &SampleSet,
        vocabulary: &Vocabulary,
        labels:     &LabelEncoder,
        channel:    &mut ProgressChannel,
        cancel:     &CancellationToken,
    ) -> Result<(TrainedModel, TrainReport)> {
        let opts = &self.options;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // ── Shape and resource checks ─────────────────────────────────────────
        let config = TextClassifierConfig::new(vocabulary.len(), labels.len(), vocabulary.max_len())
            .with_embed_dim(opts.embed_dim)
            .with_hidden_dim(opts.hidden_dim);
        let parameters = config.num_params();
        if parameters > opts.max_parameters {
            return Err(PipelineError::Resource(format!(
                "model needs {parameters} parameters, limit is {}",
                opts.max_parameters
            )));
        }

        // ── Encode and split ──────────────────────────────────────────────────
        let encoded = encode_samples(samples, vocabulary, labels)?;
        let (train_samples, val_samples) =
            split_train_val(encoded, opts.validation_split, opts.seed);
        let train_set = EncodedDataset::new(train_samples);
        let val_set   = EncodedDataset::new(val_samples);

        let class_weights = opts
            .class_weighting
            .then(|| balanced_class_weights(train_set.as_slice(), labels.len()));

        channel.progress(self.progress_span.0);
        channel.log(format!(
            "Training on {} samples ({} validation), {} classes, {} parameters",
            train_set.sample_count(),
            val_set.sample_count(),
            labels.len(),
            parameters
        ));

        // ── Model, optimiser, loss ────────────────────────────────────────────
        let device = self.device.clone();
        let mut model: TextClassifier<TrainBackend> = config.init(opts.seed, &device);
        let mut optim = AdamConfig::new().with_epsilon(1e-7).init();

        let train_loss_fn: CrossEntropyLoss<TrainBackend> = CrossEntropyLossConfig::new()
            .with_weights(class_weights)
            .init(&device);
        let val_loss_fn: CrossEntropyLoss<InferBackend> = CrossEntropyLossConfig::new().init(&device);

        let train_batcher = ClassifierBatcher::<TrainBackend>::new(device.clone());
        let val_batcher   = ClassifierBatcher::<InferBackend>::new(device.clone());

        let mut rng = StdRng::seed_from_u64(opts.seed);
        let mut order: Vec<usize> = (0..train_set.sample_count()).collect();
        let mut stopper = EarlyStopping::new(opts.patience);
        let mut best: Option<TextClassifier<InferBackend>> = None;
        let mut metrics: Vec<EpochMetrics> = Vec::with_capacity(opts.epochs);
        let mut stopped_early = false;

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in 1..=opts.epochs {
            order.shuffle(&mut rng);

            let mut loss_sum = 0.0f64;
            let mut seen     = 0usize;
            let mut correct  = 0usize;

            for chunk in order.chunks(opts.batch_size) {
                if cancel.is_cancelled() {
                    channel.log(format!("Training cancelled during epoch {epoch}"));
                    return Err(PipelineError::Cancelled);
                }

                let items: Vec<&EncodedSample> =
                    chunk.iter().map(|&i| &train_set.as_slice()[i]).collect();
                let batch = train_batcher.batch(&items);

                let output = model.forward_classification(
                    batch.input_ids,
                    batch.attention_mask,
                    batch.labels.clone(),
                    &train_loss_fn,
                );

                let loss_val: f64 = output.loss.clone().into_scalar().elem::<f64>();
                if !loss_val.is_finite() {
                    channel.log(format!("Loss diverged at epoch {epoch}: {loss_val}"));
                    return Err(PipelineError::TrainingDiverged { epoch, loss: loss_val });
                }

                correct  += count_correct(output.logits, batch.labels);
                loss_sum += loss_val * items.len() as f64;
                seen     += items.len();

                // Backward pass + Adam update
                let grads = output.loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(opts.learning_rate, model, grads);
            }

            let train_loss     = loss_sum / seen.max(1) as f64;
            let train_accuracy = correct as f64 / seen.max(1) as f64;

            // ── Validation phase ──────────────────────────────────────────────
            let snapshot = model.valid();
            let (val_loss, val_accuracy) = if val_set.sample_count() == 0 {
                (None, None)
            } else {
                let (loss, acc) = evaluate(
                    &snapshot,
                    val_set.as_slice(),
                    opts.batch_size,
                    &val_batcher,
                    &val_loss_fn,
                );
                (Some(loss), Some(acc))
            };

            let epoch_metrics = EpochMetrics { epoch, train_loss, train_accuracy, val_loss, val_accuracy };
            channel.log(format_epoch(&epoch_metrics, opts.epochs));
            channel.progress(self.scaled_progress(epoch));

            let decision = stopper.check(epoch, &epoch_metrics);
            metrics.push(epoch_metrics);

            if opts.early_stopping {
                match decision {
                    StoppingDecision::NewBest => best = Some(snapshot),
                    StoppingDecision::Stop => {
                        channel.log(format!(
                            "Early stopping at epoch {epoch}; restoring epoch {}",
                            stopper.best_epoch
                        ));
                        stopped_early = true;
                        break;
                    }
                    StoppingDecision::NoImprovement => {}
                }
            }
        }

        let epochs_run = metrics.len();
        let best_epoch = if opts.early_stopping { stopper.best_epoch } else { epochs_run };
        let model = match best {
            Some(best) if opts.early_stopping => best,
            _ => model.valid(),
        };

        tracing::info!("Training complete after {} epochs", epochs_run);

        let report = TrainReport {
            epochs_run,
            best_epoch,
            stopped_early,
            train_samples: train_set.sample_count(),
            validation_samples: val_set.sample_count(),
            parameters,
            metrics,
        };
        let trained = TrainedModel { model, config, seed: opts.seed, epochs_run };
        Ok((trained, report))
    }

    fn scaled_progress(&self, epoch: usize) -> u8 {
        let (start, end) = self.progress_span;
        let span = (end - start) as usize;
        start + (span * epoch / self.options.epochs.max(1)) as u8
    }
}

/// Convenience wrapper: validate `options` and train once.
pub fn train(
    samples:    &SampleSet,
    vocabulary: &Vocabulary,
    labels:     &LabelEncoder,
    options:    &TrainingOptions,
    channel:    &mut ProgressChannel,
    cancel:     &CancellationToken,
) -> Result<(TrainedModel, TrainReport)> {
    Trainer::new(options.clone())?.train(samples, vocabulary, labels, channel, cancel)
}

/// n_samples / (n_present_classes * count[c]); absent classes get 1.0.
fn balanced_class_weights(samples: &[EncodedSample], num_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; num_classes];
    for sample in samples {
        if let Some(c) = counts.get_mut(sample.label as usize) {
            *c += 1;
        }
    }
    let total   = samples.len() as f32;
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f32;
    counts
        .iter()
        .map(|&c| if c == 0 { 1.0 } else { total / (present * c as f32) })
        .collect()
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted.equal(labels).int().sum().into_scalar().elem::<i64>();
    correct.max(0) as usize
}

fn evaluate(
    model:      &TextClassifier<InferBackend>,
    samples:    &[EncodedSample],
    batch_size: usize,
    batcher:    &ClassifierBatcher<InferBackend>,
    loss_fn:    &CrossEntropyLoss<InferBackend>,
) -> (f64, f64) {
    let mut loss_sum = 0.0f64;
    let mut correct  = 0usize;

    for chunk in samples.chunks(batch_size) {
        let items: Vec<&EncodedSample> = chunk.iter().collect();
        let batch  = batcher.batch(&items);
        let logits = model.forward(batch.input_ids, batch.attention_mask);

        let batch_loss: f64 = loss_fn
            .forward(logits.clone(), batch.labels.clone())
            .into_scalar()
            .elem::<f64>();
        loss_sum += batch_loss * items.len() as f64;
        correct  += count_correct(logits, batch.labels);
    }

    let total = samples.len().max(1) as f64;
    (loss_sum / total, correct as f64 / total)
}

fn format_epoch(m: &EpochMetrics, epochs: usize) -> String {
    let mut line = format!(
        "Epoch {:>3}/{} | loss={:.4} | acc={:.1}%",
        m.epoch,
        epochs,
        m.train_loss,
        m.train_accuracy * 100.0
    );
    if let (Some(loss), Some(acc)) = (m.val_loss, m.val_accuracy) {
        line.push_str(&format!(" | val_loss={:.4} | val_acc={:.1}%", loss, acc * 100.0));
    }
    line
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::{fit, TokenizerOptions};
    use crate::domain::sample::Sample;
    use crate::error::ErrorKind;
    use std::sync::{Arc, Mutex};

    fn samples() -> SampleSet {
        let mut set = Vec::new();
        for text in ["hi", "hello", "hey there", "good morning", "hello friend"] {
            set.push(Sample::new(text, "greeting"));
        }
        for text in ["bye", "goodbye", "see you", "farewell friend", "bye now"] {
            set.push(Sample::new(text, "farewell"));
        }
        set.into_iter().collect()
    }

    fn small_options() -> TrainingOptions {
        TrainingOptions {
            epochs: 4,
            batch_size: 4,
            embed_dim: 8,
            hidden_dim: 8,
            learning_rate: 1e-2,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let o = TrainingOptions::default();
        assert_eq!(o.epochs, 12);
        assert_eq!(o.batch_size, 32);
        assert_eq!(o.validation_split, 0.1);
        assert!(!o.early_stopping);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn test_unknown_option_key_is_rejected() {
        let err = TrainingOptions::from_document(Format::Json, r#"{"epochz": 3}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let ok = TrainingOptions::from_document(Format::Toml, "epochs = 3\nearly_stopping = true\n").unwrap();
        assert_eq!(ok.epochs, 3);
        assert!(ok.early_stopping);
        assert_eq!(ok.batch_size, 32);

        let yaml = TrainingOptions::from_document(Format::Yaml, "batch_size: 8\n").unwrap();
        assert_eq!(yaml.batch_size, 8);
    }

    #[test]
    fn test_out_of_range_options() {
        for bad in [
            TrainingOptions { epochs: 0, ..Default::default() },
            TrainingOptions { batch_size: 0, ..Default::default() },
            TrainingOptions { validation_split: 1.0, ..Default::default() },
            TrainingOptions { validation_split: -0.1, ..Default::default() },
            TrainingOptions { learning_rate: f64::NAN, ..Default::default() },
            TrainingOptions { patience: 0, ..Default::default() },
        ] {
            let err = Trainer::new(bad).err().map(|e| e.kind());
            assert_eq!(err, Some(ErrorKind::InvalidConfig));
        }
    }

    #[test]
    fn test_balanced_class_weights() {
        let s = |label| EncodedSample { input_ids: vec![2], attention_mask: vec![1], label };
        let weights = balanced_class_weights(&[s(0), s(0), s(0), s(1)], 3);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-6);
        assert!((weights[1] - 2.0).abs() < 1e-6);
        assert_eq!(weights[2], 1.0);
    }

    #[test]
    fn test_train_reports_progress_and_metrics() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut channel = ProgressChannel::silent().with_progress(move |p| sink.lock().unwrap().push(p));

        let trainer = Trainer::new(small_options()).unwrap().with_progress_span(20, 85);
        let (trained, report) = trainer
            .train(&set, &vocab, &labels, &mut channel, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.epochs_run, 4);
        assert_eq!(report.metrics.len(), 4);
        assert_eq!(report.train_samples + report.validation_samples, 10);
        assert_eq!(report.validation_samples, 1);
        assert_eq!(trained.config.num_classes, 2);

        let progress = seen.lock().unwrap().clone();
        assert_eq!(progress.first(), Some(&20));
        assert_eq!(progress.last(), Some(&85));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_training_is_reproducible() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();
        let run = || {
            train(&set, &vocab, &labels, &small_options(), &mut ProgressChannel::silent(), &CancellationToken::new())
                .unwrap()
                .0
                .model
                .to_weights()
                .unwrap()
        };
        let a = run();
        let b = run();
        for (x, y) in a.embedding.iter().zip(&b.embedding) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = train(&set, &vocab, &labels, &small_options(), &mut ProgressChannel::silent(), &cancel)
            .err()
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_cancelled_mid_training() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        // Cancel as soon as the first epoch reports progress.
        let mut channel = ProgressChannel::silent().with_progress(move |p| {
            if p > 0 {
                trigger.cancel();
            }
        });
        let options = TrainingOptions { epochs: 10, ..small_options() };
        let err = train(&set, &vocab, &labels, &options, &mut channel, &cancel)
            .err()
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_huge_learning_rate_diverges() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();
        let options = TrainingOptions { learning_rate: 1e38, epochs: 5, ..small_options() };
        match train(&set, &vocab, &labels, &options, &mut ProgressChannel::silent(), &CancellationToken::new()) {
            Err(PipelineError::TrainingDiverged { epoch, loss }) => {
                assert!(epoch >= 1);
                assert!(!loss.is_finite());
            }
            Err(other) => panic!("expected TrainingDiverged, got {other:?}"),
            Ok(_) => panic!("expected TrainingDiverged, training succeeded"),
        }
    }

    #[test]
    fn test_parameter_limit_is_resource_error() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();
        let options = TrainingOptions { max_parameters: 10, ..small_options() };
        let err = train(&set, &vocab, &labels, &options, &mut ProgressChannel::silent(), &CancellationToken::new())
            .err()
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Resource));
    }

    #[test]
    fn test_early_stopping_keeps_best_epoch() {
        let set = samples();
        let (vocab, labels) = fit(&set, &TokenizerOptions::default()).unwrap();
        let options = TrainingOptions {
            epochs: 30,
            early_stopping: true,
            patience: 1,
            learning_rate: 0.05,
            ..small_options()
        };
        let (trained, report) =
            train(&set, &vocab, &labels, &options, &mut ProgressChannel::silent(), &CancellationToken::new())
                .unwrap();
        assert!(report.best_epoch >= 1 && report.best_epoch <= report.epochs_run);
        assert_eq!(trained.epochs_run, report.epochs_run);
        if report.stopped_early {
            assert!(report.epochs_run < 30);
        }
    }
}
