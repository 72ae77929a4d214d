//! Service contracts.
//!
//! ```text
//!   authenticate() ──→ list_targets() ──→ adapt_circuit() ──→ submit()
//!                                                              │
//!                      fetch_result() ←── poll_status() ←──────┘
//! ```
//!
//! All remote methods are async and the handles are `Send + Sync` so a
//! single authenticated handle can be shared between the submitting caller,
//! background monitors and on-demand status checks.

use std::sync::Arc;

use async_trait::async_trait;
use qhub_ir::Circuit;

use crate::counts::Counts;
use crate::error::HalResult;
use crate::job::{RemoteJobId, RemoteJobStatus};
use crate::program::{ProgramPayload, ProgramRequest};
use crate::target::Target;

/// Entry point to a remote execution service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Service name for logs.
    fn name(&self) -> &str;

    /// Exchange a credential for an authenticated handle.
    ///
    /// A rejected credential MUST surface as an error for which
    /// [`HalError::is_unauthorized`](crate::HalError::is_unauthorized) holds.
    async fn authenticate(&self, token: &str) -> HalResult<Arc<dyn ServiceHandle>>;
}

/// An authenticated session with the remote service.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    /// Every target visible to this credential, operational or not.
    async fn list_targets(&self) -> HalResult<Vec<Target>>;

    /// Rewrite a circuit into the target's native layout.
    async fn adapt_circuit(&self, circuit: &Circuit, target: &Target) -> HalResult<Circuit>;

    /// Dispatch an adapted circuit to a target.
    async fn submit(
        &self,
        target: &Target,
        circuit: &Circuit,
        program: ProgramRequest,
        shots: u32,
    ) -> HalResult<RemoteJobId>;

    /// Current lifecycle state of a job.
    async fn poll_status(&self, job_id: &RemoteJobId) -> HalResult<RemoteJobStatus>;

    /// Result of a job whose status is [`RemoteJobStatus::Done`].
    async fn fetch_result(&self, job_id: &RemoteJobId) -> HalResult<ProgramPayload>;

    /// Identifier of the target the job was sent to.
    async fn job_target(&self, job_id: &RemoteJobId) -> HalResult<String>;
}

/// Synchronous local executor used to produce comparison results.
pub trait LocalSimulator: Send + Sync {
    /// Execute `shots` repetitions and histogram the measured bits.
    fn run(&self, circuit: &Circuit, shots: u32) -> HalResult<Counts>;
}
