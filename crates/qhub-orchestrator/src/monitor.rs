//! Background job monitors.
//!
//! One supervised task per submitted job polls the remote status until the
//! job is terminal and writes what it observes into the [`JobStore`].
//!
//! ```text
//!   poll ──→ Queued/Running ──→ write OnQueue/Executing ──→ sleep ──→ poll
//!     │
//!     ├──→ Done ──────────────→ fetch + format ──→ write Completed
//!     ├──→ Cancelled/Error ───→ write Failed("Job failed: <status>")
//!     └──→ error / panic ─────→ write Failed(<reason>)
//! ```
//!
//! Monitors share one [`CancellationToken`]; cancelling it stops every
//! monitor without writing anything. A semaphore bounds how many monitors
//! talk to the service at the same time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use qhub_hal::{RemoteJobId, RemoteJobStatus, ServiceHandle};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::clock::Clock;
use crate::error::{OrchestratorError, Result};
use crate::job::JobState;
use crate::job_store::{JobStore, UpdateOutcome};
use crate::results::ResultFormatter;

/// What a monitor needs besides the service handle.
#[derive(Clone)]
pub struct MonitorDeps {
    pub store: Arc<JobStore>,
    pub formatter: ResultFormatter,
    pub clock: Arc<dyn Clock>,
}

/// Owns every job monitor of one orchestrator.
pub struct MonitorSupervisor {
    tracker: TaskTracker,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
    poll_interval: Duration,
}

/// Whether a watch loop should keep going.
enum Step {
    Continue,
    Stop,
}

impl MonitorSupervisor {
    pub fn new(poll_interval: Duration, max_concurrent_polls: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            permits: Arc::new(Semaphore::new(max_concurrent_polls.max(1))),
            poll_interval,
        }
    }

    /// Token cancelled on shutdown. Other background tasks may hang off it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of monitors still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Start watching `job_id`. The job's record must already be stored.
    pub fn spawn(&self, job_id: RemoteJobId, handle: Arc<dyn ServiceHandle>, deps: MonitorDeps) {
        let span = info_span!("monitor", job_id = %job_id);
        let cancel = self.cancel.clone();
        let permits = Arc::clone(&self.permits);
        let poll_interval = self.poll_interval;

        self.tracker.spawn(
            async move {
                let watch = watch(&job_id, handle.as_ref(), &deps, &permits, poll_interval, &cancel);
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!("Monitor cancelled");
                        return;
                    }
                    outcome = AssertUnwindSafe(watch).catch_unwind() => outcome,
                };

                let reason = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Monitoring failed");
                        e.to_string()
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!(panic = %message, "Monitor panicked");
                        format!("Monitor crashed: {message}")
                    }
                };
                write_state(&deps, &job_id, JobState::Failed(reason));
            }
            .instrument(span),
        );
    }

    /// Cancel every monitor and wait for all of them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All job monitors stopped");
    }
}

async fn watch(
    job_id: &RemoteJobId,
    handle: &dyn ServiceHandle,
    deps: &MonitorDeps,
    permits: &Semaphore,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        // The permit is held for one poll step, not across the sleep.
        let step = {
            let _permit = permits
                .acquire()
                .await
                .map_err(|e| OrchestratorError::RemoteQueryError(e.to_string()))?;
            poll_once(job_id, handle, deps).await?
        };
        if let Step::Stop = step {
            return Ok(());
        }

        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

async fn poll_once(
    job_id: &RemoteJobId,
    handle: &dyn ServiceHandle,
    deps: &MonitorDeps,
) -> Result<Step> {
    let status = handle
        .poll_status(job_id)
        .await
        .map_err(|e| OrchestratorError::RemoteQueryError(e.to_string()))?;
    debug!(status = %status, "Polled job status");

    let next = match &status {
        RemoteJobStatus::Queued => JobState::OnQueue,
        RemoteJobStatus::Running => JobState::Executing,
        RemoteJobStatus::Done => return complete(job_id, handle, deps).await,
        RemoteJobStatus::Cancelled | RemoteJobStatus::Error(_) => {
            write_state(deps, job_id, JobState::Failed(format!("Job failed: {status}")));
            return Ok(Step::Stop);
        }
    };

    match write_state(deps, job_id, next) {
        // Someone else (a status check) already finished the job.
        UpdateOutcome::Terminal(_) | UpdateOutcome::Missing => Ok(Step::Stop),
        UpdateOutcome::Applied(_) | UpdateOutcome::Regressed(_) => Ok(Step::Continue),
    }
}

async fn complete(
    job_id: &RemoteJobId,
    handle: &dyn ServiceHandle,
    deps: &MonitorDeps,
) -> Result<Step> {
    let Some(record) = deps.store.get(job_id.as_str()) else {
        return Ok(Step::Stop);
    };
    if record.is_terminal() {
        return Ok(Step::Stop);
    }

    let (outcome, artifacts) = deps.formatter.fetch_and_format(handle, &record).await?;
    let now = deps.clock.now();
    let result = deps.store.update_if_not_terminal(job_id.as_str(), |r| {
        r.status = JobState::Completed;
        r.outcome = Some(outcome);
        r.artifacts.fill_from(&artifacts);
        r.updated_at = now;
    });
    match result {
        UpdateOutcome::Applied(_) => info!("Job completed"),
        _ => {
            // Keep images rendered by this pass even if a status check won.
            deps.store.backfill_artifacts(job_id.as_str(), &artifacts);
        }
    }
    Ok(Step::Stop)
}

fn write_state(deps: &MonitorDeps, job_id: &RemoteJobId, state: JobState) -> UpdateOutcome {
    let now = deps.clock.now();
    let outcome = deps.store.update_if_not_terminal(job_id.as_str(), |r| {
        r.status = state;
        r.updated_at = now;
    });
    match &outcome {
        UpdateOutcome::Applied(r) => debug!(status = %r.status, "Job state updated"),
        UpdateOutcome::Terminal(r) => debug!(status = %r.status, "Job already terminal"),
        UpdateOutcome::Regressed(r) => debug!(status = %r.status, "Ignored stale job state"),
        UpdateOutcome::Missing => warn!("Monitored job missing from store"),
    }
    outcome
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
