// ============================================================
// Layer 3 - Progress / Log Channel and Cancellation
// ============================================================
// The notification boundary between a long-running stage and
// whoever launched it (a GUI event loop, the CLI, a script).
//
//   ProgressChannel   - optional progress and log callbacks.
//                       Either may be absent; the stage runs the
//                       same either way. Percentages are clamped to
//                       [0, 100] and never go backwards.
//   CancellationToken - a shared flag the trainer polls at batch
//                       boundaries.
//
// Callbacks run synchronously on the worker thread, so they must
// return promptly. `from_sender` wires the channel to an mpsc
// queue, which never blocks the sender.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
    Arc,
};

/// One event emitted on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(u8),
    Log(String),
}

type ProgressFn = Box<dyn FnMut(u8) + Send>;
type LogFn = Box<dyn FnMut(&str) + Send>;

/// Optional progress and log observers for a pipeline run.
#[derive(Default)]
pub struct ProgressChannel {
    progress: Option<ProgressFn>,
    log: Option<LogFn>,
    last: u8,
}

impl ProgressChannel {
    /// A channel with no observers attached.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, cb: impl FnMut(u8) + Send + 'static) -> Self {
        self.progress = Some(Box::new(cb));
        self
    }

    pub fn with_log(mut self, cb: impl FnMut(&str) + Send + 'static) -> Self {
        self.log = Some(Box::new(cb));
        self
    }

    /// Forward every event into an mpsc queue.
    /// A dropped receiver is ignored; the run carries on.
    pub fn from_sender(tx: Sender<ProgressEvent>) -> Self {
        let log_tx = tx.clone();
        Self::silent()
            .with_progress(move |p| {
                let _ = tx.send(ProgressEvent::Progress(p));
            })
            .with_log(move |m| {
                let _ = log_tx.send(ProgressEvent::Log(m.to_string()));
            })
    }

    /// Report a percentage. Values below the last report are raised to it.
    pub fn progress(&mut self, percent: u8) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        if let Some(cb) = self.progress.as_mut() {
            cb(percent);
        }
    }

    /// Append a human-readable status line. Mirrored to tracing.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{message}");
        if let Some(cb) = self.log.as_mut() {
            cb(message);
        }
    }

    /// The highest percentage reported so far.
    pub fn last_progress(&self) -> u8 {
        self.last
    }
}

impl std::fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("progress", &self.progress.is_some())
            .field("log", &self.log.is_some())
            .field("last", &self.last)
            .finish()
    }
}

/// Cooperative cancellation flag shared between a caller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
