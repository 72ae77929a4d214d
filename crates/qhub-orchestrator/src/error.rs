//! Error types for the orchestration core.

use thiserror::Error;

use crate::cache::CacheError;

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors surfaced to callers of the orchestration core.
///
/// Validation problems are returned synchronously from `connect` and
/// `submit`. Failures observed while a job is being watched never surface
/// here; they end up as a `Failed` job record instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// The credential was empty or rejected by the service.
    #[error("Invalid API token: {0}")]
    InvalidCredential(String),

    /// The service could not be reached or answered with an error.
    #[error("Failed to connect to the execution service: {0}")]
    ConnectionError(String),

    /// The service reported no target able to accept jobs.
    #[error("No operational targets available")]
    NoOperationalTargets,

    /// An operation needed a live service handle.
    #[error("Not connected to the execution service")]
    NotConnected,

    /// The requested target is not among the connected targets.
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    /// The circuit needs more qubits than the target provides.
    #[error("Circuit requires {required} qubits but target {target} has {available}")]
    CircuitTooLarge {
        /// Target identifier.
        target: String,
        /// Qubits the circuit uses.
        required: u32,
        /// Qubits the target offers.
        available: u32,
    },

    /// A diagram or histogram could not be produced.
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// The local comparison run failed or its parameters were rejected.
    #[error("Local simulation failed: {0}")]
    LocalSimulationFailed(String),

    /// Sampler programs must measure at least one qubit.
    #[error("Sampler circuits must contain at least one measurement")]
    MissingMeasurement,

    /// Estimator programs need an observable over at least two qubits.
    #[error("Estimator requires at least 2 active qubits, found {0}")]
    InsufficientQubits(usize),

    /// The service refused or failed the submission.
    #[error("Job submission failed: {0}")]
    RemoteSubmissionError(String),

    /// A status or result query failed.
    #[error("Failed to query job: {0}")]
    RemoteQueryError(String),

    /// Program mode string or payload shape not recognised.
    #[error("Unknown program type: {0}")]
    UnknownProgramType(String),

    /// Cache storage error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}
