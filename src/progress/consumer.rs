//! Per-file progress tracking for one upload session.
//!
//! The consumer folds progress events into `FileProgressState`s, notifies the
//! UI on every change, and fires the completion callback once the server
//! reports `session-complete`. A broken stream never fails the upload; the
//! upload responses stay authoritative.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::progress::channel::ProgressSubscription;
use crate::progress::events::ProgressEvent;

/// Stage of one file within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStage {
    Queued,
    Uploading {
        percent: u8,
        label: Option<String>,
    },
    Complete,
    Error {
        message: String,
    },
}

impl FileStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStage::Complete | FileStage::Error { .. })
    }
}

/// Ephemeral view of one file's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProgressState {
    pub file_index: usize,
    pub name: String,
    #[serde(flatten)]
    pub stage: FileStage,
}

/// A file the progress stream reported as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file_index: usize,
    pub name: String,
    pub message: String,
}

/// Callback invoked with a snapshot after every file state change.
pub type FileProgressListener = Arc<dyn Fn(&FileProgressState) + Send + Sync>;

/// Callback invoked once on `session-complete` with `(has_errors, errors)`.
pub type CompletionListener = Arc<dyn Fn(bool, &[FileFailure]) + Send + Sync>;

/// What the consumer observed by the time it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadProgressReport {
    /// `session-complete` was received.
    pub session_completed: bool,
    /// The stream failed or ended before `session-complete`.
    pub degraded: bool,
    pub total: Option<usize>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug)]
struct TrackedFile {
    state: FileProgressState,
    finished_at: Option<Instant>,
}

pub struct ProgressConsumer {
    files: BTreeMap<usize, TrackedFile>,
    finished: HashSet<usize>,
    failures: Vec<FileFailure>,
    total: Option<usize>,
    linger: Duration,
    on_file: Option<FileProgressListener>,
    on_complete: Option<CompletionListener>,
}

impl ProgressConsumer {
    pub fn new(linger: Duration) -> Self {
        Self {
            files: BTreeMap::new(),
            finished: HashSet::new(),
            failures: Vec::new(),
            total: None,
            linger,
            on_file: None,
            on_complete: None,
        }
    }

    pub fn with_file_listener(mut self, listener: Option<FileProgressListener>) -> Self {
        self.on_file = listener;
        self
    }

    pub fn with_completion_listener(mut self, listener: Option<CompletionListener>) -> Self {
        self.on_complete = listener;
        self
    }

    /// Current state of a file still being displayed.
    pub fn state(&self, file_index: usize) -> Option<&FileProgressState> {
        self.files.get(&file_index).map(|t| &t.state)
    }

    /// Snapshot of all displayed files, by index.
    pub fn snapshot(&self) -> Vec<FileProgressState> {
        self.files.values().map(|t| t.state.clone()).collect()
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    /// Applies one event. Returns `true` when the session is complete.
    pub fn apply(&mut self, event: ProgressEvent) -> bool {
        if let Some(index) = event.file_index() {
            if self.finished.contains(&index) {
                debug!("[PROGRESS] Ignoring {} for finished file {}", event.name(), index);
                return false;
            }
        }

        match event {
            ProgressEvent::Connected => {
                debug!("[PROGRESS] Connected");
                false
            }
            ProgressEvent::SessionStart { total } => {
                self.total = Some(total);
                false
            }
            ProgressEvent::FileStart { index, name } => {
                self.update(index, Some(name), FileStage::Queued);
                false
            }
            ProgressEvent::FileProgress {
                index,
                percent,
                stage,
            } => {
                self.update(
                    index,
                    None,
                    FileStage::Uploading {
                        percent,
                        label: stage,
                    },
                );
                false
            }
            ProgressEvent::FileComplete { index, name } => {
                self.update(index, Some(name), FileStage::Complete);
                false
            }
            ProgressEvent::FileError {
                index,
                name,
                message,
            } => {
                self.update(index, Some(name), FileStage::Error { message: message.clone() });
                let name = self
                    .state(index)
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                self.failures.push(FileFailure {
                    file_index: index,
                    name,
                    message,
                });
                false
            }
            ProgressEvent::SessionComplete => true,
        }
    }

    /// Moves a file to `stage`. Callers skip files that already finished.
    fn update(&mut self, index: usize, name: Option<String>, stage: FileStage) {
        let tracked = self.files.entry(index).or_insert_with(|| TrackedFile {
            state: FileProgressState {
                file_index: index,
                name: String::new(),
                stage: FileStage::Queued,
            },
            finished_at: None,
        });

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            tracked.state.name = name;
        }
        // A late file-start must not reset a file that is already uploading
        if !(stage == FileStage::Queued && tracked.state.stage != FileStage::Queued) {
            tracked.state.stage = stage;
        }
        if tracked.state.stage.is_terminal() {
            tracked.finished_at = Some(Instant::now());
            self.finished.insert(index);
        }

        if let Some(listener) = &self.on_file {
            listener(&tracked.state);
        }
    }

    /// Drops finished files whose linger period has elapsed.
    pub fn sweep(&mut self, now: Instant) {
        let linger = self.linger;
        self.files.retain(|_, tracked| match tracked.finished_at {
            Some(at) => now.duration_since(at) < linger,
            None => true,
        });
    }

    /// Consumes the subscription until `session-complete`, a channel failure,
    /// or the stream closing.
    pub async fn run(mut self, mut subscription: ProgressSubscription) -> UploadProgressReport {
        let mut sweep = tokio::time::interval(self.linger.max(Duration::from_millis(1)));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut report = UploadProgressReport::default();

        loop {
            tokio::select! {
                msg = subscription.next() => match msg {
                    Some(Ok(event)) => {
                        if self.apply(event) {
                            subscription.close();
                            report.session_completed = true;
                            let has_errors = !self.failures.is_empty();
                            info!(
                                "[PROGRESS] Session complete ({} file errors)",
                                self.failures.len()
                            );
                            if let Some(listener) = &self.on_complete {
                                listener(has_errors, &self.failures);
                            }
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("[PROGRESS] Channel failed: {}", e);
                        subscription.close();
                        report.degraded = true;
                        break;
                    }
                    None => {
                        warn!("[PROGRESS] Stream closed before session-complete");
                        report.degraded = true;
                        break;
                    }
                },
                _ = sweep.tick() => self.sweep(Instant::now()),
            }
        }

        report.total = self.total;
        report.failures = self.failures;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn start(index: usize, name: &str) -> ProgressEvent {
        ProgressEvent::FileStart {
            index,
            name: name.to_string(),
        }
    }

    fn complete(index: usize, name: &str) -> ProgressEvent {
        ProgressEvent::FileComplete {
            index,
            name: name.to_string(),
        }
    }

    #[test]
    fn out_of_order_events_complete_both_files() {
        let mut consumer = ProgressConsumer::new(Duration::from_secs(2));
        consumer.apply(start(1, "b.mp4"));
        consumer.apply(start(0, "a.mp4"));
        consumer.apply(complete(1, "b.mp4"));
        consumer.apply(complete(0, "a.mp4"));

        assert_eq!(consumer.state(0).unwrap().stage, FileStage::Complete);
        assert_eq!(consumer.state(1).unwrap().stage, FileStage::Complete);
    }

    #[test]
    fn progress_before_start_creates_state() {
        let mut consumer = ProgressConsumer::new(Duration::from_secs(2));
        consumer.apply(ProgressEvent::FileProgress {
            index: 3,
            percent: 40,
            stage: Some("uploading".into()),
        });
        consumer.apply(start(3, "late.mov"));

        let state = consumer.state(3).unwrap();
        assert_eq!(state.name, "late.mov");
        assert_eq!(
            state.stage,
            FileStage::Uploading {
                percent: 40,
                label: Some("uploading".into())
            }
        );
    }

    #[test]
    fn terminal_state_does_not_regress() {
        let mut consumer = ProgressConsumer::new(Duration::from_secs(2));
        consumer.apply(start(0, "a.mp4"));
        consumer.apply(ProgressEvent::FileError {
            index: 0,
            name: "a.mp4".into(),
            message: "Codec not supported".into(),
        });
        consumer.apply(ProgressEvent::FileProgress {
            index: 0,
            percent: 90,
            stage: None,
        });
        consumer.apply(complete(0, "a.mp4"));
        consumer.apply(ProgressEvent::FileError {
            index: 0,
            name: "a.mp4".into(),
            message: "Retried and failed".into(),
        });

        assert_eq!(
            consumer.state(0).unwrap().stage,
            FileStage::Error {
                message: "Codec not supported".into()
            }
        );
        assert_eq!(consumer.failures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_files_linger_then_disappear() {
        let mut consumer = ProgressConsumer::new(Duration::from_secs(2));
        consumer.apply(start(0, "a.mp4"));
        consumer.apply(start(1, "b.mp4"));
        consumer.apply(complete(0, "a.mp4"));

        tokio::time::advance(Duration::from_millis(1_500)).await;
        consumer.sweep(Instant::now());
        assert!(consumer.state(0).is_some());

        tokio::time::advance(Duration::from_millis(600)).await;
        consumer.sweep(Instant::now());
        assert!(consumer.state(0).is_none());
        // still in flight
        assert!(consumer.state(1).is_some());
    }

    #[tokio::test]
    async fn run_invokes_completion_callback_with_errors() {
        let (tx, sub) = ProgressSubscription::channel();
        let close_handle = sub.close_handle();
        let seen: Arc<Mutex<Option<(bool, Vec<FileFailure>)>>> = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let file_updates = Arc::new(Mutex::new(0usize));
        let file_updates_clone = file_updates.clone();

        let consumer = ProgressConsumer::new(Duration::from_secs(2))
            .with_file_listener(Some(Arc::new(move |_state: &FileProgressState| {
                *file_updates_clone.lock().unwrap() += 1;
            })))
            .with_completion_listener(Some(Arc::new(
                move |has_errors: bool, errors: &[FileFailure]| {
                    *seen_clone.lock().unwrap() = Some((has_errors, errors.to_vec()));
                },
            )));

        for event in [
            ProgressEvent::Connected,
            ProgressEvent::SessionStart { total: 2 },
            start(0, "a.mp4"),
            start(1, "b.mp4"),
            complete(0, "a.mp4"),
            ProgressEvent::FileError {
                index: 1,
                name: "b.mp4".into(),
                message: "Too large".into(),
            },
            ProgressEvent::SessionComplete,
        ] {
            tx.send(Ok(event)).await.unwrap();
        }

        let report = consumer.run(sub).await;
        assert!(report.session_completed);
        assert!(!report.degraded);
        assert_eq!(report.total, Some(2));
        assert!(close_handle.is_cancelled());

        let (has_errors, errors) = seen.lock().unwrap().clone().unwrap();
        assert!(has_errors);
        assert_eq!(errors[0].name, "b.mp4");
        assert_eq!(errors[0].message, "Too large");
        assert_eq!(*file_updates.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn channel_failure_is_degraded_not_fatal() {
        let (tx, sub) = ProgressSubscription::channel();
        let called = Arc::new(Mutex::new(false));
        let called_clone = called.clone();

        let consumer = ProgressConsumer::new(Duration::from_secs(2)).with_completion_listener(
            Some(Arc::new(move |_: bool, _: &[FileFailure]| {
                *called_clone.lock().unwrap() = true;
            })),
        );

        tx.send(Ok(start(0, "a.mp4"))).await.unwrap();
        tx.send(Err(crate::error::AppError::ChannelFailed("reset".into())))
            .await
            .unwrap();

        let report = consumer.run(sub).await;
        assert!(report.degraded);
        assert!(!report.session_completed);
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn stream_end_without_completion_is_degraded() {
        let (tx, sub) = ProgressSubscription::channel();
        drop(tx);
        let report = ProgressConsumer::new(Duration::from_secs(2)).run(sub).await;
        assert!(report.degraded);
    }
}
