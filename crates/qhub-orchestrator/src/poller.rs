//! On-demand status reconciliation.
//!
//! [`StatusPoller::check_job_status`] answers from the [`JobStore`] when it
//! can and otherwise asks the service directly, writing what it learns back
//! into the store. It races with the job's monitor; the store's
//! update-if-not-terminal rule decides who wins.

use std::sync::Arc;

use qhub_hal::{HalError, RemoteJobStatus, ServiceHandle};
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::connection::{ConnectionContext, ConnectionManager};
use crate::job::{JobRecord, JobState, QueueInfo};
use crate::job_store::JobStore;
use crate::results::ResultFormatter;

pub struct StatusPoller {
    connections: ConnectionManager,
    store: Arc<JobStore>,
    formatter: ResultFormatter,
    clock: Arc<dyn Clock>,
    seconds_per_pending_job: u64,
}

impl StatusPoller {
    pub fn new(
        connections: ConnectionManager,
        store: Arc<JobStore>,
        formatter: ResultFormatter,
        clock: Arc<dyn Clock>,
        seconds_per_pending_job: u64,
    ) -> Self {
        Self {
            connections,
            store,
            formatter,
            clock,
            seconds_per_pending_job,
        }
    }

    /// Current snapshot of a job.
    ///
    /// Never fails: problems reaching the service come back as a `Failed`
    /// snapshot that is not stored, since the job itself may be fine.
    #[instrument(skip(self, ctx), fields(job_id = %job_id))]
    pub async fn check_job_status(&self, ctx: &mut ConnectionContext, job_id: &str) -> JobRecord {
        let now = self.clock.now();
        let Some(record) = self.store.get(job_id) else {
            debug!("Unknown job, returning placeholder");
            return JobRecord::placeholder(job_id.into(), now);
        };
        if record.is_terminal() {
            return record;
        }

        if !self.connections.ensure_connected(ctx).await {
            return record.failed_snapshot(
                "Not connected to the execution service; reconnect to refresh this job",
                now,
            );
        }
        let Some(handle) = ctx.handle() else {
            return record.failed_snapshot("Not connected to the execution service", now);
        };

        let status = match handle.poll_status(&record.job_id).await {
            Ok(status) => status,
            Err(e) => return self.query_failed(ctx, &record, &e),
        };
        debug!(status = %status, "Queried job status");

        match status {
            RemoteJobStatus::Queued => {
                let queue_info = self.queue_info(handle.as_ref(), &record).await;
                self.persist(&record, |r| {
                    r.status = JobState::OnQueue;
                    if queue_info.is_some() {
                        r.queue_info = queue_info;
                    }
                })
            }
            RemoteJobStatus::Running => self.persist(&record, |r| r.status = JobState::Executing),
            RemoteJobStatus::Done => self.complete(ctx, handle.as_ref(), &record).await,
            other => self.persist(&record, |r| {
                r.status = JobState::Failed(format!("Job failed: {other}"));
            }),
        }
    }

    async fn complete(
        &self,
        ctx: &mut ConnectionContext,
        handle: &dyn ServiceHandle,
        record: &JobRecord,
    ) -> JobRecord {
        let payload = match handle.fetch_result(&record.job_id).await {
            Ok(payload) => payload,
            Err(e) => return self.query_failed(ctx, record, &e),
        };
        let Some(program_type) = record.program_type else {
            return self.persist(record, |r| {
                r.status = JobState::Failed("Job has no program type".to_string());
            });
        };

        match self
            .formatter
            .format(
                &record.job_id,
                program_type,
                payload,
                record.comparison_counts.as_ref(),
            )
            .await
        {
            Ok((outcome, artifacts)) => {
                let stored = self.persist(record, |r| {
                    r.status = JobState::Completed;
                    r.outcome = Some(outcome);
                    r.artifacts.fill_from(&artifacts);
                });
                if stored.artifacts.is_missing_any_of(&artifacts) {
                    self.store
                        .backfill_artifacts(record.job_id.as_str(), &artifacts)
                        .unwrap_or(stored)
                } else {
                    stored
                }
            }
            Err(e) => self.persist(record, |r| r.status = JobState::Failed(e.to_string())),
        }
    }

    /// Queue position of a queued job, from its target's current backlog.
    async fn queue_info(&self, handle: &dyn ServiceHandle, record: &JobRecord) -> Option<QueueInfo> {
        let lookup = async {
            let target_id = handle.job_target(&record.job_id).await?;
            let targets = handle.list_targets().await?;
            Ok::<_, HalError>(targets.into_iter().find(|t| t.id == target_id))
        };
        match lookup.await {
            Ok(Some(target)) => Some(QueueInfo::from_pending(
                target.pending_jobs,
                self.seconds_per_pending_job,
            )),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to look up queue position");
                None
            }
        }
    }

    /// Store an update and return the record the store now holds.
    fn persist<F>(&self, record: &JobRecord, update: F) -> JobRecord
    where
        F: FnOnce(&mut JobRecord),
    {
        let now = self.clock.now();
        self.store
            .update_if_not_terminal(record.job_id.as_str(), |r| {
                update(r);
                r.updated_at = now;
            })
            .into_record()
            .unwrap_or_else(|| record.clone())
    }

    fn query_failed(
        &self,
        ctx: &mut ConnectionContext,
        record: &JobRecord,
        error: &HalError,
    ) -> JobRecord {
        if error.is_unauthorized() {
            warn!("Credential rejected while checking job; clearing connection");
            ctx.clear();
        } else {
            warn!(error = %error, "Job status query failed");
        }
        record.failed_snapshot(
            format!("Could not retrieve job status from the execution service: {error}"),
            self.clock.now(),
        )
    }
}
