// ============================================================
// Layer 6 - Artifact Store
// ============================================================
// One directory per input format, so models trained from JSON,
// TOML and YAML documents never overwrite each other:
//
//   <root>/
//     json/
//       tokenizer.json          ← Vocabulary (HF WordLevel)
//       label_encoder.json      ← {label: id}
//       text_classifier.mpk     ← Burn weights (named MessagePack)
//       text_classifier.json    ← ModelManifest
//       metrics.csv             ← per-epoch metrics
//       text_classifier.q8      ← int8 export
//       .staging/               ← in-flight writes only
//     toml/ ...
//     yaml/ ...
//
// Atomic publish:
//   1. write <ns>/.staging/<file>.<pid>.<seq>.tmp
//   2. fsync it
//   3. rename onto <ns>/<file>
// The staging directory sits inside the namespace, so the rename
// never crosses a filesystem and readers see either the old file
// or the new one, never a torn write.
//
// A set of files (tokenizer, labels, weights, manifest, metrics)
// is published all-or-nothing:
//   1. write and fsync every .tmp first
//   2. per file: link the current file to a .bak, then rename
//      the .tmp into place
// If any step fails, the renamed files are put back from their
// .bak (or removed if they are new), so the namespace still holds
// the previous set.
//
// Namespace locks are process-wide: one set of held directories
// guarded by a parking_lot Mutex, with a Condvar to wake waiters.
// Different namespaces never block each other.

use std::{
    collections::BTreeSet,
    fmt,
    fs::{self, File},
    io::{ErrorKind as IoErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::{Condvar, Mutex};

use crate::domain::format::Format;
use crate::error::{PipelineError, Result};

const STAGING_DIR: &str = ".staging";

static PUBLISH_SEQ: AtomicU64 = AtomicU64::new(0);
static HELD_NAMESPACES: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());
static NAMESPACE_RELEASED: Condvar = Condvar::new();

/// Hex blake3 digest, used to co-version artifacts.
pub fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

// ─── ArtifactKind ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Tokenizer,
    LabelEncoder,
    ModelWeights,
    ModelManifest,
    Metrics,
    QuantizedModel,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Tokenizer,
        ArtifactKind::LabelEncoder,
        ArtifactKind::ModelWeights,
        ArtifactKind::ModelManifest,
        ArtifactKind::Metrics,
        ArtifactKind::QuantizedModel,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Tokenizer => "tokenizer.json",
            ArtifactKind::LabelEncoder => "label_encoder.json",
            ArtifactKind::ModelWeights => "text_classifier.mpk",
            ArtifactKind::ModelManifest => "text_classifier.json",
            ArtifactKind::Metrics => "metrics.csv",
            ArtifactKind::QuantizedModel => "text_classifier.q8",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

// ─── ArtifactNamespace ────────────────────────────────────────────────────────

/// The per-format artifact directory. Created lazily on first publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNamespace {
    format: Format,
    dir:    PathBuf,
}

impl ArtifactNamespace {
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn name(&self) -> &'static str {
        self.format.namespace()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn not_found(&self, kind: ArtifactKind) -> PipelineError {
        PipelineError::ArtifactNotFound {
            namespace: self.name().to_string(),
            kind: kind.file_name().to_string(),
        }
    }
}

// ─── NamespaceLock ────────────────────────────────────────────────────────────

/// Exclusive hold on one namespace; released on drop.
#[derive(Debug)]
pub struct NamespaceLock {
    key: PathBuf,
}

impl NamespaceLock {
    fn acquire(key: PathBuf) -> Self {
        let mut held = HELD_NAMESPACES.lock();
        while held.contains(&key) {
            NAMESPACE_RELEASED.wait(&mut held);
        }
        held.insert(key.clone());
        Self { key }
    }

    fn try_acquire(key: PathBuf) -> Option<Self> {
        let mut held = HELD_NAMESPACES.lock();
        if held.contains(&key) {
            return None;
        }
        held.insert(key.clone());
        Some(Self { key })
    }
}

impl Drop for NamespaceLock {
    fn drop(&mut self) {
        HELD_NAMESPACES.lock().remove(&self.key);
        NAMESPACE_RELEASED.notify_all();
    }
}

fn lock_key(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

// ─── ArtifactStore ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace(&self, format: Format) -> ArtifactNamespace {
        ArtifactNamespace {
            format,
            dir: self.namespace_path(format),
        }
    }

    pub fn namespace_path(&self, format: Format) -> PathBuf {
        self.root.join(format.namespace())
    }

    /// Block until no one else holds `namespace`, then hold it.
    pub fn lock(&self, namespace: &ArtifactNamespace) -> NamespaceLock {
        let lock = NamespaceLock::acquire(lock_key(namespace.dir()));
        tracing::debug!("Locked namespace '{}'", namespace.name());
        lock
    }

    /// Hold `namespace` only if it is free right now.
    pub fn try_lock(&self, namespace: &ArtifactNamespace) -> Option<NamespaceLock> {
        NamespaceLock::try_acquire(lock_key(namespace.dir()))
    }

    /// Atomically replace one artifact. Returns its final path.
    pub fn publish(
        &self,
        namespace: &ArtifactNamespace,
        kind:      ArtifactKind,
        bytes:     &[u8],
    ) -> Result<PathBuf> {
        let staging = namespace.dir().join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let seq = PUBLISH_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = staging.join(format!("{}.{}.{}.tmp", kind.file_name(), std::process::id(), seq));
        let target = namespace.path(kind);

        let written = write_synced(&tmp, bytes).and_then(|()| fs::rename(&tmp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        // Only succeeds once no other publish is in flight
        let _ = fs::remove_dir(&staging);

        tracing::debug!(
            "Published {} ({} bytes) to namespace '{}'",
            kind,
            bytes.len(),
            namespace.name()
        );
        Ok(target)
    }

    /// Publish several artifacts as one set: either every file is
    /// replaced or, on error, the namespace keeps the previous set.
    /// Returns the final paths in the given order.
    pub fn publish_set(
        &self,
        namespace: &ArtifactNamespace,
        artifacts: &[(ArtifactKind, Vec<u8>)],
    ) -> Result<Vec<PathBuf>> {
        let staging = namespace.dir().join(STAGING_DIR);
        fs::create_dir_all(&staging)?;

        let mut staged: Vec<StagedFile> = Vec::with_capacity(artifacts.len());
        let mut result = Ok(());
        for (kind, bytes) in artifacts {
            let file = StagedFile::new(&staging, namespace, *kind);
            let written = write_synced(&file.tmp, bytes);
            staged.push(file);
            if let Err(e) = written {
                result = Err(e);
                break;
            }
        }

        let mut committed = 0;
        if result.is_ok() {
            for file in staged.iter_mut() {
                if let Err(e) = file.back_up().and_then(|()| fs::rename(&file.tmp, &file.target)) {
                    result = Err(e);
                    break;
                }
                committed += 1;
            }
        }

        if let Err(e) = result {
            for file in staged[..committed].iter().rev() {
                if let Err(restore) = file.restore() {
                    tracing::error!("Cannot restore {} in '{}': {}", file.kind, namespace.name(), restore);
                }
            }
            discard_staging(&staging, &staged);
            tracing::warn!("Publish to namespace '{}' failed, previous set kept: {}", namespace.name(), e);
            return Err(e.into());
        }

        discard_staging(&staging, &staged);
        tracing::debug!(
            "Published {} artifacts to namespace '{}'",
            staged.len(),
            namespace.name()
        );
        Ok(staged.into_iter().map(|f| f.target).collect())
    }

    pub fn load(&self, namespace: &ArtifactNamespace, kind: ArtifactKind) -> Result<Vec<u8>> {
        match fs::read(namespace.path(kind)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(namespace.not_found(kind)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, namespace: &ArtifactNamespace, kind: ArtifactKind) -> bool {
        namespace.path(kind).is_file()
    }

    /// Remove every published artifact and any leftover staging files.
    /// Returns how many artifacts were removed.
    pub fn clear(&self, namespace: &ArtifactNamespace) -> Result<usize> {
        let mut removed = 0;
        for kind in ArtifactKind::ALL {
            match fs::remove_file(namespace.path(kind)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        match fs::remove_dir_all(namespace.dir().join(STAGING_DIR)) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("Cleared {} artifacts from namespace '{}'", removed, namespace.name());
        Ok(removed)
    }

    /// Copy one artifact out of the store. A directory `dest` receives
    /// the artifact under its standard file name.
    pub fn export(
        &self,
        namespace: &ArtifactNamespace,
        kind:      ArtifactKind,
        dest:      &Path,
    ) -> Result<PathBuf> {
        let bytes = self.load(namespace, kind)?;
        let target = if dest.is_dir() {
            dest.join(kind.file_name())
        } else {
            dest.to_path_buf()
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        write_synced(&target, &bytes)?;
        tracing::info!("Exported {} from '{}' to '{}'", kind, namespace.name(), target.display());
        Ok(target)
    }
}

/// One member of a set publish: the new bytes at `tmp`, a link to
/// the file being replaced at `backup`.
struct StagedFile {
    kind:       ArtifactKind,
    tmp:        PathBuf,
    backup:     PathBuf,
    target:     PathBuf,
    had_target: bool,
}

impl StagedFile {
    fn new(staging: &Path, namespace: &ArtifactNamespace, kind: ArtifactKind) -> Self {
        let seq = PUBLISH_SEQ.fetch_add(1, Ordering::Relaxed);
        let stem = format!("{}.{}.{}", kind.file_name(), std::process::id(), seq);
        Self {
            kind,
            tmp:        staging.join(format!("{stem}.tmp")),
            backup:     staging.join(format!("{stem}.bak")),
            target:     namespace.path(kind),
            had_target: false,
        }
    }

    /// Keep the current target reachable from `backup`. The target
    /// itself stays in place.
    fn back_up(&mut self) -> std::io::Result<()> {
        match fs::hard_link(&self.target, &self.backup) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
            Err(_) => {
                fs::copy(&self.target, &self.backup)?;
            }
        }
        self.had_target = true;
        Ok(())
    }

    /// Undo a rename that already happened.
    fn restore(&self) -> std::io::Result<()> {
        if self.had_target {
            fs::rename(&self.backup, &self.target)
        } else {
            fs::remove_file(&self.target)
        }
    }
}

fn discard_staging(staging: &Path, staged: &[StagedFile]) {
    for file in staged {
        let _ = fs::remove_file(&file.tmp);
        let _ = fs::remove_file(&file.backup);
    }
    // Only succeeds once no other publish is in flight
    let _ = fs::remove_dir(staging);
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::{
        sync::{mpsc, Arc},
        thread,
        time::Duration,
    };

    #[test]
    fn test_namespace_layout() {
        let store = ArtifactStore::new("generated");
        let ns = store.namespace(Format::Yaml);
        assert_eq!(ns.dir(), Path::new("generated/yaml"));
        assert_eq!(ns.path(ArtifactKind::Tokenizer), Path::new("generated/yaml/tokenizer.json"));
        assert_eq!(store.namespace_path(Format::Toml), Path::new("generated/toml"));
    }

    #[test]
    fn test_publish_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Json);

        let path = store.publish(&ns, ArtifactKind::Metrics, b"epoch\n").unwrap();
        assert_eq!(path, dir.path().join("json").join("metrics.csv"));
        assert_eq!(store.load(&ns, ArtifactKind::Metrics).unwrap(), b"epoch\n");

        store.publish(&ns, ArtifactKind::Metrics, b"replaced").unwrap();
        assert_eq!(store.load(&ns, ArtifactKind::Metrics).unwrap(), b"replaced");
        assert!(!ns.dir().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_publish_set_replaces_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Toml);
        store.publish(&ns, ArtifactKind::Tokenizer, b"old tokenizer").unwrap();

        let paths = store
            .publish_set(
                &ns,
                &[
                    (ArtifactKind::Tokenizer, b"new tokenizer".to_vec()),
                    (ArtifactKind::LabelEncoder, b"new labels".to_vec()),
                ],
            )
            .unwrap();
        assert_eq!(paths, vec![ns.path(ArtifactKind::Tokenizer), ns.path(ArtifactKind::LabelEncoder)]);
        assert_eq!(store.load(&ns, ArtifactKind::Tokenizer).unwrap(), b"new tokenizer");
        assert_eq!(store.load(&ns, ArtifactKind::LabelEncoder).unwrap(), b"new labels");
        assert!(!ns.dir().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_failed_publish_set_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Json);
        store.publish(&ns, ArtifactKind::Tokenizer, b"old tokenizer").unwrap();

        // A directory where the metrics file belongs cannot be replaced
        fs::create_dir_all(ns.path(ArtifactKind::Metrics).join("blocked")).unwrap();

        let err = store
            .publish_set(
                &ns,
                &[
                    (ArtifactKind::Tokenizer, b"new tokenizer".to_vec()),
                    (ArtifactKind::LabelEncoder, b"new labels".to_vec()),
                    (ArtifactKind::Metrics, b"epoch\n".to_vec()),
                ],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        assert_eq!(store.load(&ns, ArtifactKind::Tokenizer).unwrap(), b"old tokenizer");
        assert!(!store.exists(&ns, ArtifactKind::LabelEncoder));
        assert!(ns.path(ArtifactKind::Metrics).is_dir());
        assert!(!ns.dir().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Toml);
        let err = store.load(&ns, ArtifactKind::ModelWeights).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
        assert!(!store.exists(&ns, ArtifactKind::ModelWeights));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let json = store.namespace(Format::Json);
        let yaml = store.namespace(Format::Yaml);

        store.publish(&json, ArtifactKind::Tokenizer, b"json").unwrap();
        store.publish(&yaml, ArtifactKind::Tokenizer, b"yaml").unwrap();
        assert_eq!(store.clear(&json).unwrap(), 1);
        assert_eq!(store.load(&yaml, ArtifactKind::Tokenizer).unwrap(), b"yaml");
        assert!(!store.exists(&json, ArtifactKind::Tokenizer));
    }

    #[test]
    fn test_export_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = store.namespace(Format::Json);
        store.publish(&ns, ArtifactKind::QuantizedModel, b"SLQ8").unwrap();

        let path = store.export(&ns, ArtifactKind::QuantizedModel, out.path()).unwrap();
        assert_eq!(path, out.path().join("text_classifier.q8"));
        assert_eq!(fs::read(path).unwrap(), b"SLQ8");
    }

    #[test]
    fn test_lock_excludes_same_namespace_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let json = store.namespace(Format::Json);
        let toml = store.namespace(Format::Toml);

        let held = store.lock(&json);
        assert!(store.try_lock(&json).is_none());
        assert!(store.try_lock(&toml).is_some());
        drop(held);
        assert!(store.try_lock(&json).is_some());
    }

    #[test]
    fn test_lock_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path()));
        let ns = store.namespace(Format::Yaml);

        let held = store.lock(&ns);
        let (tx, rx) = mpsc::channel();
        let worker = {
            let store = Arc::clone(&store);
            let ns = ns.clone();
            thread::spawn(move || {
                let _lock = store.lock(&ns);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        worker.join().unwrap();
    }
}
