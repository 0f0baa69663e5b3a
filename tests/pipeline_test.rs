// End-to-end pipeline runs through the public API on the NdArray backend.

use std::{fs, path::Path, sync::mpsc};

use suggest_lite::application::{
    artifacts_use_case::ArtifactsUseCase,
    classify_use_case::{ClassifyUseCase, Runtime},
    convert_use_case::ConvertUseCase,
    train_use_case::{TrainConfig, TrainInput, TrainUseCase, TrainingJob},
};
use suggest_lite::data::{builder::DatasetBuilder, interpreter::interpret};
use suggest_lite::domain::{
    format::Format,
    progress::{CancellationToken, ProgressChannel, ProgressEvent},
};
use suggest_lite::infra::{
    artifact_store::{ArtifactKind, ArtifactStore},
    checkpoint::ModelStore,
};
use suggest_lite::ml::trainer::TrainingOptions;
use suggest_lite::ErrorKind;

const JSON_DOC: &str = r#"{
  "greeting": ["hello there", "hi there friend", "hello friend", "good morning friend"],
  "weather": ["is it raining", "weather forecast today", "will it rain today", "sunny weather"]
}"#;

const TOML_DOC: &str = r#"
greeting = ["hello there", "hi there friend", "hello friend", "good morning friend"]
weather = ["is it raining", "weather forecast today", "will it rain today", "sunny weather"]
"#;

const YAML_DOC: &str = "
greeting:
  - hello there
  - hi there friend
  - hello friend
  - good morning friend
weather:
  - is it raining
  - weather forecast today
  - will it rain today
  - sunny weather
";

fn config(root: &Path, seed: u64) -> TrainConfig {
    TrainConfig {
        artifacts_dir: root.to_path_buf(),
        training: TrainingOptions {
            epochs: 40,
            batch_size: 4,
            validation_split: 0.0,
            learning_rate: 0.05,
            seed,
            embed_dim: 16,
            hidden_dim: 16,
            ..TrainingOptions::default()
        },
        ..TrainConfig::default()
    }
}

fn train(root: &Path, format: Format, raw: &str, seed: u64) -> suggest_lite::Result<suggest_lite::application::train_use_case::TrainSummary> {
    TrainUseCase::new(config(root, seed)).execute(
        &TrainInput::inline(format, raw),
        &mut ProgressChannel::silent(),
        &CancellationToken::new(),
    )
}

#[test]
fn test_train_convert_classify_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let summary = train(dir.path(), Format::Json, JSON_DOC, 42).unwrap();
    assert_eq!(summary.items_serialized, 8);
    assert_eq!(summary.labels, vec!["greeting", "weather"]);

    let store = ArtifactStore::new(dir.path());
    let report = ConvertUseCase::new(store.clone()).execute(Format::Json).unwrap();
    assert!(report.path.is_file());

    for runtime in [Runtime::Float, Runtime::Quantized] {
        let classifier = ClassifyUseCase::load(&store, Format::Json, runtime).unwrap();
        let top = classifier.classify("Hello, friend!", 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].label, "greeting");
        assert!(top[0].probability >= top[1].probability);

        let top = classifier.classify("will it rain", 1).unwrap();
        assert_eq!(top[0].label, "weather");
    }
}

#[test]
fn test_formats_produce_identical_samples_and_encoders() {
    let build = |format, raw| {
        DatasetBuilder::default()
            .build(&interpret(format, raw).unwrap())
            .unwrap()
            .samples
    };
    let json = build(Format::Json, JSON_DOC);
    assert_eq!(json, build(Format::Toml, TOML_DOC));
    assert_eq!(json, build(Format::Yaml, YAML_DOC));

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let mut manifests = Vec::new();
    for (format, raw) in [(Format::Json, JSON_DOC), (Format::Toml, TOML_DOC), (Format::Yaml, YAML_DOC)] {
        train(dir.path(), format, raw, 7).unwrap();
        manifests.push(ModelStore::new(&store, &store.namespace(format)).load_manifest().unwrap());
    }
    for manifest in &manifests[1..] {
        assert_eq!(manifest.vocabulary_digest, manifests[0].vocabulary_digest);
        assert_eq!(manifest.labels_digest, manifests[0].labels_digest);
    }

    // Each format landed in its own namespace
    for format in Format::ALL {
        assert!(store.exists(&store.namespace(format), ArtifactKind::ModelWeights));
    }
}

#[test]
fn test_same_seed_reproduces_weights() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    train(a.path(), Format::Yaml, YAML_DOC, 3).unwrap();
    train(b.path(), Format::Yaml, YAML_DOC, 3).unwrap();

    let digest = |root: &Path| {
        let store = ArtifactStore::new(root);
        ModelStore::new(&store, &store.namespace(Format::Yaml)).load_manifest().unwrap().weights_digest
    };
    assert_eq!(digest(a.path()), digest(b.path()));
}

#[test]
fn test_single_label_is_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let err = train(dir.path(), Format::Toml, r#"greeting = ["hi", "hello"]"#, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLabels);
    assert!(!dir.path().join("toml").exists());
}

#[test]
fn test_syntax_error_reports_location() {
    let dir = tempfile::tempdir().unwrap();
    let err = train(dir.path(), Format::Json, "{\n  \"greeting\": [\"hi\",\n}", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(err.to_string().contains("line"));
}

#[test]
fn test_cancelled_retrain_leaves_artifacts_untouched() {
    let dir = tempfile::tempdir().unwrap();
    train(dir.path(), Format::Json, JSON_DOC, 42).unwrap();
    let ns = dir.path().join("json");
    let before: Vec<Vec<u8>> = ArtifactKind::ALL
        .iter()
        .filter(|k| ns.join(k.file_name()).exists())
        .map(|k| fs::read(ns.join(k.file_name())).unwrap())
        .collect();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = TrainUseCase::new(config(dir.path(), 99))
        .execute(&TrainInput::inline(Format::Json, JSON_DOC), &mut ProgressChannel::silent(), &cancel)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let after: Vec<Vec<u8>> = ArtifactKind::ALL
        .iter()
        .filter(|k| ns.join(k.file_name()).exists())
        .map(|k| fs::read(ns.join(k.file_name())).unwrap())
        .collect();
    assert_eq!(before, after);
    assert!(!ns.join(".staging").exists());
}

#[test]
fn test_failed_publish_keeps_previous_set_loadable() {
    let dir = tempfile::tempdir().unwrap();
    train(dir.path(), Format::Json, JSON_DOC, 42).unwrap();
    let ns = dir.path().join("json");
    let model_files = [
        ArtifactKind::Tokenizer,
        ArtifactKind::LabelEncoder,
        ArtifactKind::ModelWeights,
        ArtifactKind::ModelManifest,
    ];
    let before: Vec<Vec<u8>> = model_files.iter().map(|k| fs::read(ns.join(k.file_name())).unwrap()).collect();

    // Metrics are published last; a directory in their place makes the retrain fail mid-set
    fs::remove_file(ns.join("metrics.csv")).unwrap();
    fs::create_dir_all(ns.join("metrics.csv").join("blocked")).unwrap();
    let err = train(dir.path(), Format::Json, JSON_DOC, 99).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);

    let after: Vec<Vec<u8>> = model_files.iter().map(|k| fs::read(ns.join(k.file_name())).unwrap()).collect();
    assert_eq!(before, after);
    assert!(!ns.join(".staging").exists());

    let store = ArtifactStore::new(dir.path());
    let classifier = ClassifyUseCase::load(&store, Format::Json, Runtime::Float).unwrap();
    assert_eq!(classifier.classify("hello friend", 1).unwrap()[0].label, "greeting");
}

#[test]
fn test_convert_without_model_is_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConvertUseCase::new(ArtifactStore::new(dir.path())).execute(Format::Yaml).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingModel);
}

#[test]
fn test_retraining_makes_int8_export_stale() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let mut cfg = config(dir.path(), 1);
    cfg.convert = true;
    let summary = TrainUseCase::new(cfg)
        .execute(
            &TrainInput::inline(Format::Toml, TOML_DOC),
            &mut ProgressChannel::silent(),
            &CancellationToken::new(),
        )
        .unwrap();
    assert!(summary.conversion.is_some());

    let artifacts = ArtifactsUseCase::new(store.clone());
    assert_eq!(artifacts.status(Format::Toml).unwrap().quantized_stale, Some(false));

    train(dir.path(), Format::Toml, TOML_DOC, 2).unwrap();
    assert_eq!(artifacts.status(Format::Toml).unwrap().quantized_stale, Some(true));

    let err = ClassifyUseCase::load(&store, Format::Toml, Runtime::Quantized).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::StaleArtifact);
}

#[test]
fn test_background_job_streams_progress() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel();
    let job = TrainingJob::spawn(
        config(dir.path(), 5),
        TrainInput::inline(Format::Yaml, YAML_DOC),
        ProgressChannel::from_sender(tx),
    )
    .unwrap();
    let summary = job.join().unwrap();
    assert_eq!(summary.namespace, "yaml");

    let progress: Vec<u8> = rx
        .try_iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress(p) => Some(p),
            ProgressEvent::Log(_) => None,
        })
        .collect();
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_export_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), 4);
    cfg.convert = true;
    TrainUseCase::new(cfg)
        .execute(
            &TrainInput::inline(Format::Json, JSON_DOC),
            &mut ProgressChannel::silent(),
            &CancellationToken::new(),
        )
        .unwrap();

    let artifacts = ArtifactsUseCase::new(ArtifactStore::new(dir.path()));
    let exported = artifacts.export(Format::Json, ArtifactKind::QuantizedModel, out.path()).unwrap();
    assert_eq!(&fs::read(&exported).unwrap()[..4], b"SLQ8");

    assert_eq!(artifacts.clear(Format::Json).unwrap(), 6);
    assert!(artifacts.status(Format::Json).unwrap().is_empty());
}
