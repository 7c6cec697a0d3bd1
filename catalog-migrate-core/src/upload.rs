//! Upload Pipeline.
//!
//! `concurrency` workers drain a shared queue; every task is taken exactly
//! once. Per task:
//!
//! ```text
//! Pending -> ExistenceCheck -> Skipped | Uploading -> Uploaded | Failed
//!         -> PreviewRequested -> PreviewDone -> PublishRequested -> PublishDone
//! ```
//!
//! `reupload` bypasses the existence check. A dry run ends every task in
//! `Skipped` with `would_upload` set, lists the release requests it would send
//! in `would_release`, and never calls the target store. Preview and publish
//! apply to documents only, run whenever their flag is set, and publish waits
//! for that document's preview. When the target rejects credentials the
//! workers stop taking tasks and the remaining ones are reported as failed.
//! A task lost to a panicking worker is reported as failed too, so the summary
//! always holds one outcome per input task.

use futures::future::join_all;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::contract::TargetStore;
use crate::error::TargetError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    Image,
    JsonSheet,
    HtmlPage,
}

impl TaskKind {
    /// Documents go through preview and publish; images do not.
    pub fn is_document(&self) -> bool {
        matches!(self, TaskKind::JsonSheet | TaskKind::HtmlPage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// Target path relative to the configured organisation and repository.
    pub path: String,
    pub kind: TaskKind,
    pub content: Vec<u8>,
}

impl UploadTask {
    pub fn new(path: impl Into<String>, kind: TaskKind, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            kind,
            content,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.kind {
            TaskKind::JsonSheet => "application/json",
            TaskKind::HtmlPage => "text/html",
            TaskKind::Image => {
                let ext = self
                    .path
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default();
                match ext.as_str() {
                    "png" => "image/png",
                    "jpg" | "jpeg" => "image/jpeg",
                    "gif" => "image/gif",
                    "svg" => "image/svg+xml",
                    "webp" => "image/webp",
                    _ => "application/octet-stream",
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    Pending,
    ExistenceCheck,
    Skipped,
    Uploading,
    Uploaded,
    Failed,
    PreviewRequested,
    PreviewDone,
    PreviewFailed,
    PublishRequested,
    PublishDone,
    PublishFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub path: String,
    pub kind: TaskKind,
    pub trace: Vec<TaskState>,
    /// Set by dry runs for tasks that a real run would have sent.
    pub would_upload: bool,
    /// Release requests a real run would have sent; dry runs only.
    pub would_release: Vec<TaskState>,
    pub error: Option<String>,
    /// The target rejected credentials while processing this task.
    pub fatal: bool,
}

impl TaskOutcome {
    fn new(task: &UploadTask) -> Self {
        Self::pending(task.path.clone(), task.kind)
    }

    fn pending(path: String, kind: TaskKind) -> Self {
        Self {
            path,
            kind,
            trace: vec![TaskState::Pending],
            would_upload: false,
            would_release: Vec::new(),
            error: None,
            fatal: false,
        }
    }

    /// A task that never ran to completion.
    fn abandoned(path: String, kind: TaskKind, reason: &str) -> Self {
        let mut outcome = Self::pending(path, kind);
        outcome.trace.push(TaskState::Failed);
        outcome.error = Some(reason.to_string());
        outcome
    }

    fn record(&mut self, state: TaskState) {
        debug!(path = %self.path, state = ?state, "Task state");
        self.trace.push(state);
    }

    fn fail(&mut self, state: TaskState, e: &TargetError) {
        warn!(path = %self.path, state = ?state, error = %e, "Task step failed");
        self.trace.push(state);
        self.error = Some(e.to_string());
        self.fatal = e.is_fatal();
    }

    pub fn reached(&self, state: TaskState) -> bool {
        self.trace.contains(&state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub concurrency: usize,
    /// Upload even when the target already has the path.
    pub reupload: bool,
    pub dry_run: bool,
    pub preview: bool,
    pub publish: bool,
    pub retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            reupload: false,
            dry_run: false,
            preview: false,
            publish: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub previewed: usize,
    pub preview_failed: usize,
    pub published: usize,
    pub publish_failed: usize,
    /// Set when the target rejected credentials.
    pub fatal_error: Option<String>,
    /// One outcome per task, in input order.
    pub outcomes: Vec<TaskOutcome>,
}

impl UploadSummary {
    fn from_outcomes(outcomes: Vec<TaskOutcome>) -> Self {
        let count = |state: TaskState| outcomes.iter().filter(|o| o.reached(state)).count();
        Self {
            succeeded: count(TaskState::Uploaded),
            skipped: count(TaskState::Skipped),
            failed: count(TaskState::Failed),
            previewed: count(TaskState::PreviewDone),
            preview_failed: count(TaskState::PreviewFailed),
            published: count(TaskState::PublishDone),
            publish_failed: count(TaskState::PublishFailed),
            fatal_error: outcomes.iter().find(|o| o.fatal).and_then(|o| o.error.clone()),
            outcomes,
        }
    }
}

type Queue = Arc<Mutex<VecDeque<(usize, UploadTask)>>>;
type Finished = Arc<Mutex<Vec<(usize, TaskOutcome)>>>;

/// Uploads `tasks` with at most `options.concurrency` in flight.
pub async fn upload<T>(store: Arc<T>, tasks: Vec<UploadTask>, options: &UploadOptions) -> UploadSummary
where
    T: TargetStore + ?Sized + 'static,
{
    let total = tasks.len();
    let workers = options.concurrency.max(1).min(total.max(1));
    info!(tasks = total, workers, dry_run = options.dry_run, "Starting upload");

    let labels: Vec<(String, TaskKind)> = tasks.iter().map(|t| (t.path.clone(), t.kind)).collect();
    let queue: Queue = Arc::new(Mutex::new(tasks.into_iter().enumerate().collect()));
    let finished: Finished = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let abort = Arc::new(AtomicBool::new(false));
    let handles: Vec<_> = (0..workers)
        .map(|id| {
            tokio::spawn(worker(
                id,
                Arc::clone(&store),
                Arc::clone(&queue),
                Arc::clone(&finished),
                *options,
                Arc::clone(&abort),
            ))
        })
        .collect();

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Upload worker panicked");
        }
    }

    let mut slots: Vec<Option<TaskOutcome>> = vec![None; total];
    for (index, outcome) in finished.lock().await.drain(..) {
        slots[index] = Some(outcome);
    }
    for (index, task) in queue.lock().await.drain(..) {
        slots[index] = Some(TaskOutcome::abandoned(
            task.path,
            task.kind,
            "not attempted: target rejected credentials",
        ));
    }
    let outcomes: Vec<TaskOutcome> = slots
        .into_iter()
        .zip(labels)
        .map(|(slot, (path, kind))| {
            slot.unwrap_or_else(|| TaskOutcome::abandoned(path, kind, "upload worker panicked"))
        })
        .collect();

    let summary = UploadSummary::from_outcomes(outcomes);
    info!(
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        previewed = summary.previewed,
        published = summary.published,
        "Upload finished"
    );
    summary
}

async fn worker<T>(
    id: usize,
    store: Arc<T>,
    queue: Queue,
    finished: Finished,
    options: UploadOptions,
    abort: Arc<AtomicBool>,
) where
    T: TargetStore + ?Sized,
{
    while !abort.load(Ordering::SeqCst) {
        let next = queue.lock().await.pop_front();
        let Some((index, task)) = next else {
            break;
        };
        debug!(worker = id, path = %task.path, "Processing task");
        let outcome = process_task(store.as_ref(), &task, &options).await;
        if outcome.fatal {
            error!(worker = id, path = %task.path, "Target rejected credentials, stopping");
            abort.store(true, Ordering::SeqCst);
        }
        finished.lock().await.push((index, outcome));
    }
}

async fn process_task<T>(store: &T, task: &UploadTask, options: &UploadOptions) -> TaskOutcome
where
    T: TargetStore + ?Sized,
{
    let mut outcome = TaskOutcome::new(task);
    let path = task.path.as_str();

    if options.dry_run {
        outcome.record(TaskState::Skipped);
        outcome.would_upload = true;
        info!(path, kind = ?task.kind, bytes = task.content.len(), "Dry run: would upload");
        if task.kind.is_document() {
            if options.preview {
                outcome.would_release.push(TaskState::PreviewRequested);
            }
            if options.publish {
                outcome.would_release.push(TaskState::PublishRequested);
            }
        }
        return outcome;
    }

    let mut needs_upload = true;
    if !options.reupload {
        outcome.record(TaskState::ExistenceCheck);
        match options.retry.run(path, || store.exists(path)).await {
            Ok(true) => {
                debug!(path, "Already present, skipping upload");
                needs_upload = false;
                outcome.record(TaskState::Skipped);
            }
            Ok(false) => {}
            Err(e) if e.is_fatal() => {
                outcome.fail(TaskState::Failed, &e);
                return outcome;
            }
            Err(e) => warn!(path, error = %e, "Existence check failed, uploading anyway"),
        }
    }

    if needs_upload {
        outcome.record(TaskState::Uploading);
        let content_type = task.content_type();
        let result = options
            .retry
            .run(path, || store.put(path, &task.content, content_type))
            .await;
        if let Err(e) = result {
            outcome.fail(TaskState::Failed, &e);
            return outcome;
        }
        outcome.record(TaskState::Uploaded);
    }

    if task.kind.is_document() {
        release(store, path, options, &mut outcome).await;
    }
    outcome
}

async fn release<T>(store: &T, path: &str, options: &UploadOptions, outcome: &mut TaskOutcome)
where
    T: TargetStore + ?Sized,
{
    if options.preview {
        outcome.record(TaskState::PreviewRequested);
        if let Err(e) = options.retry.run(path, || store.preview(path)).await {
            outcome.fail(TaskState::PreviewFailed, &e);
            return;
        }
        outcome.record(TaskState::PreviewDone);
    }
    if options.publish {
        outcome.record(TaskState::PublishRequested);
        if let Err(e) = options.retry.run(path, || store.publish(path)).await {
            outcome.fail(TaskState::PublishFailed, &e);
            return;
        }
        outcome.record(TaskState::PublishDone);
    }
}
