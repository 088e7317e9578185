//! Single-worker lane for blocking work.
//!
//! Some client libraries are intrinsically synchronous. A [`BlockingLane`]
//! owns one dedicated OS thread and runs submitted jobs on it in order, so
//! an async caller can await a blocking call without stalling the
//! scheduler.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lane errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaneError {
    /// The worker thread could not be started
    #[error("Failed to start lane '{name}': {reason}")]
    Spawn { name: String, reason: String },

    /// The lane was shut down
    #[error("Lane '{name}' is closed")]
    Closed { name: String },

    /// The job panicked
    #[error("Job on lane '{name}' panicked: {message}")]
    Panicked { name: String, message: String },
}

/// Dedicated single-thread executor for blocking jobs
pub struct BlockingLane {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    exited: Mutex<Option<oneshot::Receiver<()>>>,
}

impl BlockingLane {
    /// Start a lane with its own thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn new(name: impl Into<String>) -> Result<Self, LaneError> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let (exit_tx, exit_rx) = oneshot::channel();
        // The thread is detached; shutdown waits on `exited` instead of joining
        std::thread::Builder::new()
            .name(format!("armature-lane-{}", name))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                let _ = exit_tx.send(());
            })
            .map_err(|e| LaneError::Spawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            exited: Mutex::new(Some(exit_rx)),
        })
    }

    /// Lane name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `job` on the lane thread and await its result
    ///
    /// # Errors
    ///
    /// Returns error if the lane is closed or the job panics
    pub async fn run<F, T>(&self, job: F) -> Result<T, LaneError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let wrapped: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).map_err(|payload| panic_message(&*payload));
            // The caller may have stopped waiting
            let _ = reply.send(outcome);
        });

        let sent = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|sender| sender.send(wrapped).is_ok())
            .unwrap_or(false);
        if !sent {
            return Err(self.closed());
        }

        match result.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(LaneError::Panicked {
                name: self.name.clone(),
                message,
            }),
            Err(_) => Err(self.closed()),
        }
    }

    /// Stop accepting jobs; queued jobs still run
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Close the lane and wait up to `grace` for the thread to drain its
    /// queue
    ///
    /// Never blocks the calling runtime thread. Returns `false` when a job
    /// was still running after `grace`; the thread then finishes on its own.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.close();
        let exited = self
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(exited) = exited else {
            return true;
        };
        match tokio::time::timeout(grace, exited).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                tracing::warn!(lane = %self.name, "Lane thread exited abnormally");
                true
            }
            Err(_) => {
                tracing::warn!(
                    lane = %self.name,
                    grace_ms = grace.as_millis() as u64,
                    "Lane still busy after grace period; detaching its thread"
                );
                false
            }
        }
    }

    fn closed(&self) -> LaneError {
        LaneError::Closed {
            name: self.name.clone(),
        }
    }
}

impl Drop for BlockingLane {
    fn drop(&mut self) {
        self.close();
    }
}

/// Best-effort text of a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
