//! Sequential batch target executor.
//!
//! Runs one operation per target, strictly one at a time, in display order.
//! A failed target never stops the loop. Cancellation is checked between
//! targets only; an in-flight call always runs to completion.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::job::{
    BatchJob, JobStatus, TargetDescriptor, TargetError, TargetResult, TargetStatus,
};
use crate::error::AppError;
use crate::remote::BoxFuture;

pub use crate::error::CANCELLED_BEFORE_START;

// ─────────────────────────────────────────────────────────────────────────────
// Operation Seam
// ─────────────────────────────────────────────────────────────────────────────

/// Successful result of one target's remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub remote_entity_id: String,
    /// Children are still being copied by the platform.
    pub deferred_children: bool,
}

impl TargetOutcome {
    pub fn created(remote_entity_id: impl Into<String>) -> Self {
        Self {
            remote_entity_id: remote_entity_id.into(),
            deferred_children: false,
        }
    }

    pub fn deferred(remote_entity_id: impl Into<String>) -> Self {
        Self {
            remote_entity_id: remote_entity_id.into(),
            deferred_children: true,
        }
    }
}

/// The per-target action of a batch.
pub trait TargetOperation: Send + Sync {
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome>;
}

/// Adapts an async closure into a `TargetOperation`.
pub struct FnOperation<F>(F);

pub fn from_fn<F, Fut>(f: F) -> FnOperation<F>
where
    F: Fn(TargetDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TargetOutcome, AppError>> + Send + 'static,
{
    FnOperation(f)
}

impl<F, Fut> TargetOperation for FnOperation<F>
where
    F: Fn(TargetDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TargetOutcome, AppError>> + Send + 'static,
{
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome> {
        Box::pin((self.0)(target.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot emitted after every target transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProgress {
    pub job_id: Uuid,
    pub index: usize,
    pub total: usize,
    /// Targets that reached a terminal status so far.
    pub completed: usize,
    pub result: TargetResult,
}

pub type TargetProgressListener = Arc<dyn Fn(&TargetProgress) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

pub struct BatchExecutor {
    cancel: CancellationToken,
    on_progress: Option<TargetProgressListener>,
}

impl BatchExecutor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            on_progress: None,
        }
    }

    pub fn with_progress_listener(mut self, listener: Option<TargetProgressListener>) -> Self {
        self.on_progress = listener;
        self
    }

    fn emit(&self, job: &BatchJob, index: usize, completed: usize, result: &TargetResult) {
        if let Some(listener) = &self.on_progress {
            listener(&TargetProgress {
                job_id: job.id,
                index,
                total: job.targets.len(),
                completed,
                result: result.clone(),
            });
        }
    }

    /// Runs `op` once per target and returns exactly one result per target,
    /// in target order. Sets the job's final status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the job already finished or a status
    /// transition is illegal. Both indicate a bug rather than a remote failure.
    pub async fn run(
        &self,
        job: &mut BatchJob,
        op: &dyn TargetOperation,
    ) -> Result<Vec<TargetResult>, AppError> {
        if job.status.is_terminal() {
            return Err(AppError::Internal(format!(
                "Job {} already finished as {}",
                job.short_id(),
                job.status.as_str()
            )));
        }
        job.status = JobStatus::Running;
        let total = job.targets.len();
        let mut results: Vec<TargetResult> =
            job.targets.iter().map(TargetResult::pending).collect();
        let mut completed = 0usize;

        info!(
            "[BATCH] Job {} started: {} over {} targets",
            job.short_id(),
            job.kind.as_str(),
            total
        );

        for index in 0..total {
            if self.cancel.is_cancelled() {
                info!(
                    "[BATCH] Job {} cancelled with {} targets not started",
                    job.short_id(),
                    total - index
                );
                for skipped in index..total {
                    results[skipped].fail(TargetError::from(&AppError::Cancelled))?;
                    completed += 1;
                    self.emit(job, skipped, completed, &results[skipped]);
                }
                break;
            }

            results[index].transition(TargetStatus::Processing)?;
            self.emit(job, index, completed, &results[index]);

            let target = &job.targets[index];
            match op.execute(target).await {
                Ok(outcome) => {
                    results[index].succeed(outcome.remote_entity_id, outcome.deferred_children)?;
                }
                Err(e) => {
                    let error = TargetError::from(&e);
                    warn!(
                        "[BATCH] Target {}/{} ({}) failed: {}",
                        index + 1,
                        total,
                        target.display_name(),
                        error.message
                    );
                    results[index].fail(error)?;
                }
            }
            completed += 1;
            self.emit(job, index, completed, &results[index]);
        }

        let succeeded = results
            .iter()
            .filter(|r| r.status == TargetStatus::Success)
            .count();
        job.status = JobStatus::from_counts(succeeded, total - succeeded);

        info!(
            "[BATCH] Job {} finished {}: {} succeeded, {} failed",
            job.short_id(),
            job.status.as_str(),
            succeeded,
            total - succeeded
        );

        Ok(results)
    }
}
