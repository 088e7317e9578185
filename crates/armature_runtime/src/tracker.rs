//! In-flight task tracking and coordinated shutdown.
//!
//! Every dispatched call registers with the [`TaskTracker`] and receives a
//! child of the tracker's root cancellation token. On shutdown the root is
//! cancelled, tasks get a bounded grace period to finish, and whatever is
//! left is aborted.

use armature_core::TaskId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Tracker errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// Shutdown has begun; no new tasks are accepted
    #[error("Task tracker is shutting down; refusing new task '{label}'")]
    ShuttingDown { label: String },
}

struct TrackedTask {
    label: String,
    token: CancellationToken,
    abort: Option<AbortHandle>,
}

struct TrackerInner {
    tasks: Mutex<HashMap<TaskId, TrackedTask>>,
    root: CancellationToken,
    closed: AtomicBool,
    idle: Notify,
}

impl TrackerInner {
    fn remove(&self, id: &TaskId) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.remove(id);
        if tasks.is_empty() {
            self.idle.notify_waiters();
        }
    }

    fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Outcome of a shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Tasks in flight when shutdown began
    pub cancelled: usize,
    /// Tasks that finished within the grace period
    pub drained: usize,
    /// Spawned tasks aborted after the grace period
    pub aborted: usize,
    /// Guard-only tasks still running after the grace period; they were
    /// deregistered but cannot be aborted from here
    pub abandoned: usize,
}

/// Registry of in-flight tasks
#[derive(Clone)]
pub struct TaskTracker {
    inner: Arc<TrackerInner>,
}

impl TaskTracker {
    /// Create a new tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                tasks: Mutex::new(HashMap::new()),
                root: CancellationToken::new(),
                closed: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        }
    }

    /// Register the current task; it stays tracked until the guard drops
    ///
    /// The tracker holds no abort handle for the task, so the caller must
    /// stop when [`TaskGuard::token`] is cancelled. Tasks that ignore it are
    /// reported as `abandoned` at shutdown.
    ///
    /// # Errors
    ///
    /// Returns error once shutdown has begun
    pub fn track(&self, label: impl Into<String>) -> Result<TaskGuard, TrackerError> {
        let label = label.into();
        if self.is_shutting_down() {
            return Err(TrackerError::ShuttingDown { label });
        }
        let id = TaskId::new();
        let token = self.inner.root.child_token();
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                TrackedTask {
                    label,
                    token: token.clone(),
                    abort: None,
                },
            );
        Ok(TaskGuard {
            id,
            token,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Spawn a tracked task; `task` receives the task's cancellation token
    ///
    /// # Errors
    ///
    /// Returns error once shutdown has begun
    pub fn spawn<F, Fut>(
        &self,
        label: impl Into<String>,
        task: F,
    ) -> Result<JoinHandle<Fut::Output>, TrackerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let guard = self.track(label)?;
        let id = guard.id;
        let future = task(guard.token.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            future.await
        });

        if let Some(entry) = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            entry.abort = Some(handle.abort_handle());
        }
        Ok(handle)
    }

    /// Number of tracked tasks
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.len()
    }

    /// Labels of tracked tasks
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|t| t.label.clone())
            .collect()
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Cancel every tracked task, wait up to `grace`, then abort the rest
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.inner.closed.store(true, Ordering::Release);
        let cancelled = self.in_flight();
        tracing::info!(in_flight = cancelled, grace_ms = grace.as_millis() as u64, "Cancelling in-flight tasks");
        self.inner.root.cancel();

        let inner = Arc::clone(&self.inner);
        let drained_in_time = tokio::time::timeout(grace, async move {
            loop {
                let notified = inner.idle.notified();
                if inner.len() == 0 {
                    break;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        let mut aborted = 0;
        let mut abandoned = 0;
        if !drained_in_time {
            let mut tasks = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for (id, task) in tasks.drain() {
                task.token.cancel();
                match task.abort {
                    Some(abort) => {
                        abort.abort();
                        aborted += 1;
                    }
                    None => abandoned += 1,
                }
                tracing::warn!(task = %id, label = %task.label, "Task did not finish within grace period");
            }
        }

        ShutdownReport {
            cancelled,
            drained: cancelled.saturating_sub(aborted + abandoned),
            aborted,
            abandoned,
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle for a tracked task
pub struct TaskGuard {
    id: TaskId,
    token: CancellationToken,
    inner: Arc<TrackerInner>,
}

impl TaskGuard {
    /// Task id
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancellation token for this task
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.inner.remove(&self.id);
    }
}
