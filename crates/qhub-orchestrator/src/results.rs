//! Turns remote payloads into typed outcomes and caches derived images.
//!
//! Shared by the background monitor and the on-demand status poller. Both
//! may format the same job, so images are keyed by job id and only rendered
//! when the cache does not already hold them.

use std::sync::Arc;

use qhub_hal::{Counts, ProgramPayload, RemoteJobId, ServiceHandle};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::{OrchestratorError, Result};
use crate::job::{Artifacts, JobRecord, ProgramOutcome, ProgramType};
use crate::render::ArtifactRenderer;

/// Cache key of a job's hardware histogram.
pub fn hardware_histogram_key(job_id: &RemoteJobId) -> String {
    format!("hardware_histogram_{job_id}")
}

/// Cache key of a job's hardware vs local comparison chart.
pub fn comparison_key(job_id: &RemoteJobId) -> String {
    format!("comparison_{job_id}")
}

#[derive(Clone)]
pub struct ResultFormatter {
    cache: Arc<TtlCache>,
    renderer: Arc<dyn ArtifactRenderer>,
}

impl ResultFormatter {
    pub fn new(cache: Arc<TtlCache>, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        Self { cache, renderer }
    }

    /// Build the outcome for a finished job.
    ///
    /// Returns the artifact keys that are present in the cache afterwards.
    /// Rendering or caching failures only leave the corresponding key unset.
    pub async fn format(
        &self,
        job_id: &RemoteJobId,
        program_type: ProgramType,
        payload: ProgramPayload,
        comparison_counts: Option<&Counts>,
    ) -> Result<(ProgramOutcome, Artifacts)> {
        match (program_type, payload) {
            (ProgramType::Sampler, ProgramPayload::Counts(counts)) => {
                let hardware_counts = counts.nonzero();
                let mut artifacts = Artifacts::default();

                let key = hardware_histogram_key(job_id);
                if self
                    .ensure_cached(&key, || {
                        self.renderer.histogram("Hardware results", &hardware_counts)
                    })
                    .await
                {
                    artifacts.hardware_histogram = Some(key);
                }

                if let Some(local) = comparison_counts {
                    let key = comparison_key(job_id);
                    if self
                        .ensure_cached(&key, || self.renderer.comparison(&hardware_counts, local))
                        .await
                    {
                        artifacts.comparison_image = Some(key);
                    }
                }

                Ok((ProgramOutcome::Sampler { hardware_counts }, artifacts))
            }
            (ProgramType::Estimator, ProgramPayload::Expectation(expectation_value)) => Ok((
                ProgramOutcome::Estimator { expectation_value },
                Artifacts::default(),
            )),
            (program_type, payload) => {
                let kind = match payload {
                    ProgramPayload::Counts(_) => "counts",
                    ProgramPayload::Expectation(_) => "expectation",
                };
                Err(OrchestratorError::UnknownProgramType(format!(
                    "{program_type} job returned a {kind} payload"
                )))
            }
        }
    }

    /// Fetch the result of a finished job and format it against what the
    /// store knows about the job.
    pub async fn fetch_and_format(
        &self,
        handle: &dyn ServiceHandle,
        record: &JobRecord,
    ) -> Result<(ProgramOutcome, Artifacts)> {
        let program_type = record.program_type.ok_or_else(|| {
            OrchestratorError::UnknownProgramType(format!("no program type for job {}", record.job_id))
        })?;
        let payload = handle
            .fetch_result(&record.job_id)
            .await
            .map_err(|e| OrchestratorError::RemoteQueryError(e.to_string()))?;
        self.format(
            &record.job_id,
            program_type,
            payload,
            record.comparison_counts.as_ref(),
        )
        .await
    }

    /// Render and store `key` unless it is already cached. Returns whether
    /// the key is cached afterwards.
    async fn ensure_cached<F>(&self, key: &str, render: F) -> bool
    where
        F: FnOnce() -> std::result::Result<Vec<u8>, crate::render::RenderError>,
    {
        if self.cache.contains(key).await {
            debug!(key, "Artifact already cached");
            return true;
        }
        let bytes = match render() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to render artifact");
                return false;
            }
        };
        match self.cache.set(key, bytes).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to cache artifact");
                false
            }
        }
    }
}
