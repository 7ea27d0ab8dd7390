// src/manager/tasks.rs

//! Bookkeeping of background tasks.
//!
//! Every task the manager (or a module) starts is registered here under a
//! human-readable label. When it ends, its outcome is moved from the running
//! set to the finished set; the idle reaper later drains the finished set and
//! reports failures. A failing task never affects the dispatch loop.

use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, warn};

/// Identifier of a tracked task.
pub type TaskId = u64;

/// How a tracked task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The task body returned an error; holds the full error report.
    Failed(String),
    /// The task body panicked; holds the panic message.
    Panicked(String),
    /// The task was aborted (hard shutdown).
    Cancelled,
}

impl TaskOutcome {
    pub(crate) fn from_join(result: Result<anyhow::Result<()>, JoinError>) -> Self {
        match result {
            Ok(Ok(())) => TaskOutcome::Success,
            Ok(Err(e)) => TaskOutcome::Failed(format!("{e:?}")),
            Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Panicked(panic_message(e)),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_) | TaskOutcome::Panicked(_))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Success => f.write_str("success"),
            TaskOutcome::Failed(report) => write!(f, "error: {report}"),
            TaskOutcome::Panicked(msg) => write!(f, "panic: {msg}"),
            TaskOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(e) => e.to_string(),
    }
}

/// A task that has ended but was not reaped yet.
#[derive(Debug, Clone)]
pub struct FinishedTask {
    pub id: TaskId,
    pub label: String,
    pub outcome: TaskOutcome,
}

struct RunningTask {
    label: String,
    abort: AbortHandle,
}

#[derive(Default)]
struct Inner {
    next_id: TaskId,
    running: HashMap<TaskId, RunningTask>,
    finished: Vec<FinishedTask>,
}

/// Running and finished task sets, owned by the manager.
pub struct TaskTracker {
    inner: Mutex<Inner>,
    changed: Notify,
    exception_log: Option<PathBuf>,
}

impl fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TaskTracker")
            .field("running", &inner.running.len())
            .field("finished", &inner.finished.len())
            .field("exception_log", &self.exception_log)
            .finish()
    }
}

impl TaskTracker {
    pub fn new(exception_log: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Notify::new(),
            exception_log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a task to the running set and return its id.
    ///
    /// The caller is responsible for calling [`TaskTracker::complete`] once
    /// the task ended.
    pub fn insert(&self, label: String, abort: AbortHandle) -> TaskId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        debug!(task = id, label = %label, "registered task");
        inner.running.insert(id, RunningTask { label, abort });
        id
    }

    /// Move a task from the running to the finished set.
    pub fn complete(&self, id: TaskId, outcome: TaskOutcome) {
        {
            let mut inner = self.lock();
            match inner.running.remove(&id) {
                Some(task) => {
                    debug!(task = id, label = %task.label, outcome = %outcome, "task finished");
                    inner.finished.push(FinishedTask {
                        id,
                        label: task.label,
                        outcome,
                    });
                }
                None => warn!(task = id, "completion of unknown task"),
            }
        }
        self.changed.notify_waiters();
    }

    pub fn in_flight(&self) -> usize {
        self.lock().running.len()
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.lock().running.contains_key(&id)
    }

    /// Labels of all running tasks, for diagnostics.
    pub fn running_labels(&self) -> Vec<String> {
        let inner = self.lock();
        let mut labels: Vec<(TaskId, String)> = inner
            .running
            .iter()
            .map(|(id, t)| (*id, t.label.clone()))
            .collect();
        labels.sort_by_key(|(id, _)| *id);
        labels.into_iter().map(|(_, label)| label).collect()
    }

    /// Wait until task `id` is no longer running.
    pub async fn wait_for(&self, id: TaskId) {
        loop {
            let changed = self.changed.notified();
            if !self.is_running(id) {
                return;
            }
            changed.await;
        }
    }

    /// Wait until the running set is empty.
    pub async fn wait_all(&self) {
        loop {
            let changed = self.changed.notified();
            if self.in_flight() == 0 {
                return;
            }
            changed.await;
        }
    }

    /// Abort every running task. Their outcomes are recorded as cancelled
    /// once the runtime observes the abort.
    pub fn abort_all(&self) {
        let inner = self.lock();
        for (id, task) in inner.running.iter() {
            warn!(task = *id, label = %task.label, "cancelling task");
            task.abort.abort();
        }
    }

    /// Drain the finished set, reporting every failure.
    ///
    /// Failures are logged at error level with `critical = true` and, if an
    /// exception log is configured, appended to it.
    pub fn reap(&self) -> Vec<FinishedTask> {
        let finished = std::mem::take(&mut self.lock().finished);

        for task in finished.iter().filter(|t| t.outcome.is_failure()) {
            error!(
                critical = true,
                task = task.id,
                label = %task.label,
                "exception occurred in background task: {}",
                task.outcome
            );
            if let Some(path) = &self.exception_log {
                append_exception_report(path, &task.label, &task.outcome);
            }
        }

        finished
    }
}

/// Append `<timestamp>\n<report>\n\n` to the exception log.
///
/// Best effort: I/O errors are logged and otherwise ignored.
pub fn append_exception_report(path: &Path, label: &str, outcome: &TaskOutcome) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
            writeln!(file, "{timestamp}")?;
            writeln!(file, "task [{label}] {outcome}")?;
            writeln!(file)
        });

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not write exception log");
    }
}
