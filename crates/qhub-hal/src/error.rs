//! Error types for the HAL crate.

use thiserror::Error;

/// Errors raised by a remote execution service or a local simulator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// The service rejected the credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The service could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// Job submission failed.
    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Result requested before the job finished.
    #[error("Job {0} has no result yet")]
    ResultNotReady(String),

    /// Target not known to the service.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// Invalid circuit.
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// Circuit exceeds backend capabilities.
    #[error("Circuit exceeds backend capabilities: {0}")]
    CircuitTooLarge(String),

    /// Invalid number of shots.
    #[error("Invalid shots: {0}")]
    InvalidShots(String),

    /// Instruction the executor cannot run.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl HalError {
    /// Whether the service refused the credential.
    ///
    /// Services that only surface an HTTP status in free text are
    /// recognised by a `401` or `Unauthorized` marker in the message.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            HalError::Unauthorized(_) => true,
            other => {
                let msg = other.to_string();
                msg.contains("401") || msg.contains("Unauthorized")
            }
        }
    }
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;
