// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application);
// this layer only routes, prints, and draws the progress bar.

pub mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::{
    artifacts_use_case::ArtifactsUseCase,
    classify_use_case::ClassifyUseCase,
    convert_use_case::ConvertUseCase,
    train_use_case::{TrainConfig, TrainInput, TrainSummary, TrainUseCase},
};
use crate::data::{builder::DatasetOptions, encoder::TokenizerOptions, preprocessor::NormalizationPolicy};
use crate::domain::{
    format::Format,
    progress::{CancellationToken, ProgressChannel},
};
use crate::error::PipelineError;
use crate::infra::artifact_store::ArtifactStore;
use crate::ml::trainer::TrainingOptions;
use commands::{CheckArgs, ClassifyArgs, Commands, ExportArgs, NamespaceArgs, StatusArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "suggest-lite",
    version,
    about = "Train a small text classifier from a JSON, TOML or YAML document and export it as int8."
)]
pub struct Cli {
    /// Root directory of the per-format artifact namespaces
    #[arg(long, global = true, default_value = "generated")]
    pub artifacts: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let store = ArtifactStore::new(self.artifacts.clone());
        match self.command {
            Commands::Train(args)    => run_train(self.artifacts, args),
            Commands::Convert(args)  => run_convert(store, args),
            Commands::Classify(args) => run_classify(store, args),
            Commands::Status(args)   => run_status(store, args),
            Commands::Export(args)   => run_export(store, args),
            Commands::Clear(args)    => run_clear(store, args),
            Commands::Check(args)    => run_check(store, args),
        }
    }
}

/// Converts CLI args into a TrainConfig and hands off to Layer 2.
fn run_train(artifacts: PathBuf, args: TrainArgs) -> Result<()> {
    let base = match &args.options {
        Some(path) => TrainingOptions::from_path(path)
            .with_context(|| format!("cannot load training options '{}'", path.display()))?,
        None => TrainingOptions::default(),
    };
    let normalization = NormalizationPolicy {
        lowercase:         !args.keep_case,
        strip_punctuation: !args.keep_punctuation,
    };
    let defaults = TokenizerOptions::default();
    let config = TrainConfig {
        artifacts_dir: artifacts,
        dataset: DatasetOptions {
            normalization,
            on_malformed: args.malformed_policy(),
            duplicates: args.duplicates,
        },
        tokenizer: TokenizerOptions {
            max_vocabulary: args.max_vocabulary.or(defaults.max_vocabulary),
            max_sequence_length: args.max_sequence_length.unwrap_or(defaults.max_sequence_length),
            normalization,
        },
        training: args.apply_overrides(base),
        convert: args.convert,
    };

    // Ctrl-C stops training at the next batch; the previous artifacts stay
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("cannot install the Ctrl-C handler")?;

    let input = TrainInput::File { path: args.document.clone(), format: args.format };
    let summary = train_with_progress(config, &input, &cancel)
        .with_context(|| format!("training on '{}' failed", args.document.display()))?;

    for warning in &summary.warnings {
        println!("warning: entry {}: {}", warning.position, warning.message);
    }
    println!(
        "Trained '{}' on {} items ({} labels, {} vocabulary entries) in {} epochs.",
        summary.namespace,
        summary.items_serialized,
        summary.labels.len(),
        summary.vocabulary_size,
        summary.report.epochs_run
    );
    if let Some(last) = summary.report.final_metrics() {
        println!(
            "Final train loss {:.4}, accuracy {:.3}",
            last.train_loss, last.train_accuracy
        );
    }
    for path in &summary.artifacts {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Run training behind a progress bar until it finishes or `cancel` fires.
fn train_with_progress(
    config: TrainConfig,
    input:  &TrainInput,
    cancel: &CancellationToken,
) -> Result<TrainSummary> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
            .context("invalid progress bar template")?
            .progress_chars("#>-"),
    );
    let progress_bar = bar.clone();
    let log_bar = bar.clone();
    let mut channel = ProgressChannel::silent()
        .with_progress(move |p| progress_bar.set_position(p as u64))
        .with_log(move |m| log_bar.set_message(m.to_string()));

    let result = TrainUseCase::new(config).execute(input, &mut channel, cancel);
    bar.finish_and_clear();
    if let Err(e @ PipelineError::Cancelled) = &result {
        eprintln!("{}", e.remediation());
    }
    Ok(result?)
}

fn run_convert(store: ArtifactStore, args: NamespaceArgs) -> Result<()> {
    let report = ConvertUseCase::new(store)
        .execute(args.format)
        .with_context(|| format!("cannot convert the '{}' model", args.format))?;
    println!(
        "Wrote {} ({} bytes, {:.1}x smaller, max drift {:.4})",
        report.path.display(),
        report.bytes,
        report.compression_ratio,
        report.max_drift
    );
    Ok(())
}

fn run_classify(store: ArtifactStore, args: ClassifyArgs) -> Result<()> {
    let classifier = ClassifyUseCase::load(&store, args.format, args.runtime)
        .with_context(|| format!("cannot load the '{}' model", args.format))?;
    for prediction in classifier.classify(&args.query, args.top_k)? {
        println!("{:>7.3}  {}", prediction.probability, prediction.label);
    }
    Ok(())
}

fn run_status(store: ArtifactStore, args: StatusArgs) -> Result<()> {
    let use_case = ArtifactsUseCase::new(store);
    let formats = match args.format {
        Some(format) => vec![format],
        None => Format::ALL.to_vec(),
    };
    for format in formats {
        let status = use_case.status(format)?;
        println!("[{}] {}", status.namespace, status.dir.display());
        for artifact in &status.artifacts {
            let mark = if artifact.present { "x" } else { " " };
            println!("  [{mark}] {}", artifact.file);
        }
        if let Some(stale) = status.quantized_stale {
            println!("  int8 export is {}", if stale { "STALE" } else { "current" });
        }
    }
    Ok(())
}

fn run_export(store: ArtifactStore, args: ExportArgs) -> Result<()> {
    let path = ArtifactsUseCase::new(store).export(args.format, args.artifact, &args.to)?;
    println!("Exported {} to {}", args.artifact, path.display());
    Ok(())
}

fn run_clear(store: ArtifactStore, args: NamespaceArgs) -> Result<()> {
    let removed = ArtifactsUseCase::new(store).clear(args.format)?;
    println!("Removed {removed} artifacts from '{}'", args.format);
    Ok(())
}

fn run_check(store: ArtifactStore, args: CheckArgs) -> Result<()> {
    let comparison = ArtifactsUseCase::new(store).check(&args.document, args.format)?;
    for label in &comparison.missing_from_model {
        println!("not in model:    {label}");
    }
    for label in &comparison.missing_from_document {
        println!("not in document: {label}");
    }
    if comparison.is_consistent() {
        println!(
            "'{}' model and document agree on {} labels",
            comparison.namespace, comparison.model_labels
        );
    }
    Ok(())
}
