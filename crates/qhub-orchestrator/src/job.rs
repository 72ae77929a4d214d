//! Job records kept by the orchestrator.
//!
//! ```text
//!   submit ──→ Pending ──→ OnQueue ──→ Executing ──→ Completed
//!                 │           │            │
//!                 └───────────┴────────────┴──→ Failed(reason)
//! ```
//!
//! States only move forward along this order and terminal states are final.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qhub_hal::{Counts, RemoteJobId};

use crate::error::OrchestratorError;

/// Orchestrator-side job state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submitted, not yet observed on the service.
    Pending,
    /// Waiting in the target's queue.
    OnQueue,
    /// Running on the target.
    Executing,
    /// Finished with a result.
    Completed,
    /// Finished without a result.
    Failed(String),
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }

    /// Position in the lifecycle order. Terminal states share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::OnQueue => 1,
            JobState::Executing => 2,
            JobState::Completed | JobState::Failed(_) => 3,
        }
    }

    /// Short upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::OnQueue => "ON_QUEUE",
            JobState::Executing => "EXECUTING",
            JobState::Completed => "COMPLETED",
            JobState::Failed(_) => "FAILED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed(msg) => write!(f, "FAILED: {msg}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Kind of program a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramType {
    /// Measurement sampling.
    Sampler,
    /// Observable expectation value.
    Estimator,
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProgramType::Sampler => "sampler",
            ProgramType::Estimator => "estimator",
        })
    }
}

impl FromStr for ProgramType {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sampler" => Ok(ProgramType::Sampler),
            "estimator" => Ok(ProgramType::Estimator),
            other => Err(OrchestratorError::UnknownProgramType(other.to_string())),
        }
    }
}

/// Typed result of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "program", rename_all = "lowercase")]
pub enum ProgramOutcome {
    /// Hardware measurement histogram.
    Sampler {
        /// Bitstring counts measured on the target.
        hardware_counts: Counts,
    },
    /// Hardware expectation value.
    Estimator {
        /// Estimated ⟨O⟩.
        expectation_value: f64,
    },
}

impl ProgramOutcome {
    /// The program type that produces this outcome.
    pub fn program_type(&self) -> ProgramType {
        match self {
            ProgramOutcome::Sampler { .. } => ProgramType::Sampler,
            ProgramOutcome::Estimator { .. } => ProgramType::Estimator,
        }
    }
}

/// Queue position and wait estimate at the time of observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Jobs ahead of this one.
    pub position: Option<u32>,
    /// Heuristic wait in seconds.
    pub estimated_wait_seconds: Option<u64>,
}

impl QueueInfo {
    /// Estimate from a target's pending job count.
    pub fn from_pending(pending_jobs: u32, seconds_per_job: u64) -> Self {
        Self {
            position: Some(pending_jobs),
            estimated_wait_seconds: Some(u64::from(pending_jobs) * seconds_per_job),
        }
    }
}

/// Cache keys of images derived from a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    /// Rendered circuit diagram.
    pub circuit_diagram: Option<String>,
    /// Local simulation histogram.
    pub comparison_histogram: Option<String>,
    /// Hardware result histogram.
    pub hardware_histogram: Option<String>,
    /// Hardware vs local comparison chart.
    pub comparison_image: Option<String>,
}

impl Artifacts {
    /// Fill every key that is missing here from `other`.
    pub fn fill_from(&mut self, other: &Artifacts) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.circuit_diagram, &other.circuit_diagram);
        fill(&mut self.comparison_histogram, &other.comparison_histogram);
        fill(&mut self.hardware_histogram, &other.hardware_histogram);
        fill(&mut self.comparison_image, &other.comparison_image);
    }

    /// Whether `other` has a key this one lacks.
    pub fn is_missing_any_of(&self, other: &Artifacts) -> bool {
        let mut merged = self.clone();
        merged.fill_from(other);
        merged != *self
    }
}

/// Everything known about one submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Identifier issued by the service.
    pub job_id: RemoteJobId,
    /// Lifecycle state.
    pub status: JobState,
    /// Program kind. `None` only on placeholders for unseen ids.
    pub program_type: Option<ProgramType>,
    /// Result, present once completed.
    pub outcome: Option<ProgramOutcome>,
    /// Last known queue position.
    pub queue_info: Option<QueueInfo>,
    /// Target the job was dispatched to.
    pub target_id: Option<String>,
    /// Requested shots.
    pub shots: Option<u32>,
    /// Local simulation histogram for comparison.
    pub comparison_counts: Option<Counts>,
    /// Cache keys of derived images.
    pub artifacts: Artifacts,
    /// When the job was submitted.
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly submitted job.
    pub fn pending(
        job_id: RemoteJobId,
        program_type: ProgramType,
        target_id: impl Into<String>,
        shots: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            status: JobState::Pending,
            program_type: Some(program_type),
            outcome: None,
            queue_info: None,
            target_id: Some(target_id.into()),
            shots: Some(shots),
            comparison_counts: None,
            artifacts: Artifacts::default(),
            submitted_at: Some(now),
            updated_at: now,
        }
    }

    /// Snapshot returned for a job id the store has never seen.
    pub fn placeholder(job_id: RemoteJobId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobState::Pending,
            program_type: None,
            outcome: None,
            queue_info: None,
            target_id: None,
            shots: None,
            comparison_counts: None,
            artifacts: Artifacts::default(),
            submitted_at: None,
            updated_at: now,
        }
    }

    /// Set the local comparison histogram.
    pub fn with_comparison_counts(mut self, counts: Counts) -> Self {
        self.comparison_counts = Some(counts);
        self
    }

    /// Set the initial queue estimate.
    pub fn with_queue_info(mut self, queue_info: QueueInfo) -> Self {
        self.queue_info = Some(queue_info);
        self
    }

    /// Set the artifact keys.
    pub fn with_artifacts(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// A copy of this record marked failed, for reporting without storing.
    pub fn failed_snapshot(&self, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut snapshot = self.clone();
        snapshot.status = JobState::Failed(message.into());
        snapshot.updated_at = now;
        snapshot
    }

    /// Failure message, present iff the job failed.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            JobState::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    /// Whether the record can no longer change state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Hardware counts of a completed sampler job.
    pub fn hardware_counts(&self) -> Option<&Counts> {
        match &self.outcome {
            Some(ProgramOutcome::Sampler { hardware_counts }) => Some(hardware_counts),
            _ => None,
        }
    }

    /// Expectation value of a completed estimator job.
    pub fn expectation_value(&self) -> Option<f64> {
        match &self.outcome {
            Some(ProgramOutcome::Estimator { expectation_value }) => Some(*expectation_value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(JobState::Pending.rank() < JobState::OnQueue.rank());
        assert!(JobState::OnQueue.rank() < JobState::Executing.rank());
        assert_eq!(JobState::Completed.rank(), JobState::Failed("x".into()).rank());
        assert!(JobState::Failed("x".into()).is_terminal());
        assert!(!JobState::Executing.is_terminal());
    }

    #[test]
    fn test_program_type_parse() {
        assert_eq!("Sampler".parse::<ProgramType>().unwrap(), ProgramType::Sampler);
        assert_eq!(" estimator ".parse::<ProgramType>().unwrap(), ProgramType::Estimator);
        assert!(matches!(
            "qaoa".parse::<ProgramType>(),
            Err(OrchestratorError::UnknownProgramType(_))
        ));
    }

    #[test]
    fn test_error_only_when_failed() {
        let now = Utc::now();
        let record = JobRecord::pending("j1".into(), ProgramType::Sampler, "t", 10, now);
        assert!(record.error().is_none());
        let failed = record.failed_snapshot("Job failed: ERROR", now);
        assert_eq!(failed.error(), Some("Job failed: ERROR"));
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_queue_estimate() {
        let info = QueueInfo::from_pending(7, 10);
        assert_eq!(info.position, Some(7));
        assert_eq!(info.estimated_wait_seconds, Some(70));
    }

    #[test]
    fn test_artifact_fill() {
        let mut a = Artifacts {
            circuit_diagram: Some("d".into()),
            ..Artifacts::default()
        };
        let b = Artifacts {
            circuit_diagram: Some("other".into()),
            hardware_histogram: Some("h".into()),
            ..Artifacts::default()
        };
        assert!(a.is_missing_any_of(&b));
        a.fill_from(&b);
        assert_eq!(a.circuit_diagram.as_deref(), Some("d"));
        assert_eq!(a.hardware_histogram.as_deref(), Some("h"));
        assert!(!a.is_missing_any_of(&b));
    }
}
