//! Job submission.
//!
//! Validation happens before anything is rendered, simulated or sent, so a
//! rejected request never reaches the service. A local simulation of the
//! same circuit runs synchronously to give the caller something to compare
//! the hardware result against.

use std::sync::Arc;

use qhub_hal::{
    Counts, EstimatorOptions, HalError, LocalSimulator, Observable, PauliTerm, ProgramRequest,
    RemoteJobId, SamplerOptions, ServiceHandle,
};
use qhub_ir::Circuit;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::SubmissionConfig;
use crate::connection::ConnectionContext;
use crate::error::{OrchestratorError, Result};
use crate::job::{Artifacts, JobRecord, ProgramType, QueueInfo};
use crate::monitor::{MonitorDeps, MonitorSupervisor};
use crate::render::ArtifactRenderer;

/// A circuit to run on a target.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub circuit: Circuit,
    pub target_id: String,
    /// Shots; `None` uses the configured default.
    pub shots: Option<u32>,
    pub mode: ProgramType,
    /// Source the circuit was built from, echoed back for display.
    pub source_code: Option<String>,
}

impl SubmitRequest {
    /// A sampler request with default shots.
    pub fn new(circuit: Circuit, target_id: impl Into<String>) -> Self {
        Self {
            circuit,
            target_id: target_id.into(),
            shots: None,
            mode: ProgramType::Sampler,
            source_code: None,
        }
    }

    pub fn with_shots(mut self, shots: u32) -> Self {
        self.shots = Some(shots);
        self
    }

    pub fn with_mode(mut self, mode: ProgramType) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_source_code(mut self, source_code: impl Into<String>) -> Self {
        self.source_code = Some(source_code.into());
        self
    }
}

/// What the caller gets back from a successful submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: RemoteJobId,
    /// Rendered circuit diagram.
    pub circuit_diagram: Vec<u8>,
    /// Local simulation histogram.
    pub comparison_counts: Counts,
    /// Rendered local histogram.
    pub comparison_histogram: Vec<u8>,
    pub queue_info: QueueInfo,
    /// Cache keys of the images above.
    pub artifacts: Artifacts,
    pub source_code: Option<String>,
}

/// Validates, simulates and dispatches jobs, then hands them to a monitor.
pub struct JobSubmitter {
    cache: Arc<TtlCache>,
    renderer: Arc<dyn ArtifactRenderer>,
    simulator: Arc<dyn LocalSimulator>,
    supervisor: Arc<MonitorSupervisor>,
    deps: MonitorDeps,
    config: SubmissionConfig,
    seconds_per_pending_job: u64,
}

impl JobSubmitter {
    pub fn new(
        cache: Arc<TtlCache>,
        renderer: Arc<dyn ArtifactRenderer>,
        simulator: Arc<dyn LocalSimulator>,
        supervisor: Arc<MonitorSupervisor>,
        deps: MonitorDeps,
        config: SubmissionConfig,
        seconds_per_pending_job: u64,
    ) -> Self {
        Self {
            cache,
            renderer,
            simulator,
            supervisor,
            deps,
            config,
            seconds_per_pending_job,
        }
    }

    #[instrument(
        skip(self, ctx, request),
        fields(
            target = %request.target_id,
            mode = %request.mode,
            source_len = request.source_code.as_ref().map_or(0, String::len),
        )
    )]
    pub async fn submit(
        &self,
        ctx: &mut ConnectionContext,
        request: SubmitRequest,
    ) -> Result<Submission> {
        let SubmitRequest {
            circuit,
            target_id,
            shots,
            mode,
            source_code,
        } = request;
        let shots = shots.unwrap_or(self.config.default_shots);

        let handle = ctx.handle().ok_or(OrchestratorError::NotConnected)?;
        let target = ctx
            .target(&target_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownTarget(target_id.clone()))?;
        if circuit.num_qubits() > target.num_qubits {
            return Err(OrchestratorError::CircuitTooLarge {
                target: target.id.clone(),
                required: circuit.num_qubits(),
                available: target.num_qubits,
            });
        }
        if mode == ProgramType::Sampler && !circuit.has_measurements() {
            return Err(OrchestratorError::MissingMeasurement);
        }

        let circuit_diagram = self
            .renderer
            .circuit_diagram(&circuit)
            .map_err(|e| OrchestratorError::RenderingFailed(e.to_string()))?;

        let comparison_counts = self.simulate(&circuit, shots).await?;
        let comparison_histogram = self
            .renderer
            .histogram("Local simulation", &comparison_counts)
            .map_err(|e| OrchestratorError::RenderingFailed(e.to_string()))?;

        let artifacts = Artifacts {
            circuit_diagram: self.cache_image(circuit_diagram.clone()).await,
            comparison_histogram: self.cache_image(comparison_histogram.clone()).await,
            ..Artifacts::default()
        };

        let adapted = handle
            .adapt_circuit(&circuit, &target)
            .await
            .map_err(|e| remote_failure(ctx, e, "adaptation"))?;
        let queue_info = self.current_queue_info(ctx, handle.as_ref(), &target.id).await?;

        let program = self.program_for(mode, &adapted)?;

        let job_id = handle
            .submit(&target, &adapted, program, shots)
            .await
            .map_err(|e| remote_failure(ctx, e, "dispatch"))?;

        let record = JobRecord::pending(job_id.clone(), mode, &target.id, shots, self.deps.clock.now())
            .with_comparison_counts(comparison_counts.clone())
            .with_queue_info(queue_info)
            .with_artifacts(artifacts.clone());
        if !self.deps.store.insert_if_absent(record) {
            return Err(OrchestratorError::RemoteSubmissionError(format!(
                "service reused job id {job_id}"
            )));
        }
        self.supervisor
            .spawn(job_id.clone(), handle, self.deps.clone());

        info!(job_id = %job_id, shots, "Job submitted");
        Ok(Submission {
            job_id,
            circuit_diagram,
            comparison_counts,
            comparison_histogram,
            queue_info,
            artifacts,
            source_code,
        })
    }

    /// Queue estimate from the target's backlog as the service reports it now.
    ///
    /// A lookup failure other than a rejected credential leaves the estimate
    /// unknown.
    async fn current_queue_info(
        &self,
        ctx: &mut ConnectionContext,
        handle: &dyn ServiceHandle,
        target_id: &str,
    ) -> Result<QueueInfo> {
        match handle.list_targets().await {
            Ok(targets) => Ok(targets
                .iter()
                .find(|t| t.id == target_id)
                .map(|t| QueueInfo::from_pending(t.pending_jobs, self.seconds_per_pending_job))
                .unwrap_or_default()),
            Err(e) if e.is_unauthorized() => Err(remote_failure(ctx, e, "queue lookup")),
            Err(e) => {
                warn!(target = %target_id, error = %e, "Failed to refresh queue depth");
                Ok(QueueInfo::default())
            }
        }
    }

    /// Run the local comparison off the async runtime.
    async fn simulate(&self, circuit: &Circuit, shots: u32) -> Result<Counts> {
        let (min, max) = (self.config.min_shots, self.config.max_shots);
        if !(min..=max).contains(&shots) {
            return Err(OrchestratorError::LocalSimulationFailed(format!(
                "shots must be between {min} and {max}, got {shots}"
            )));
        }

        let simulator = Arc::clone(&self.simulator);
        let circuit = circuit.clone();
        let counts = tokio::task::spawn_blocking(move || simulator.run(&circuit, shots))
            .await
            .map_err(|e| OrchestratorError::LocalSimulationFailed(e.to_string()))?
            .map_err(|e| OrchestratorError::LocalSimulationFailed(e.to_string()))?;
        debug!(outcomes = counts.len(), "Local simulation finished");
        Ok(counts)
    }

    fn program_for(&self, mode: ProgramType, adapted: &Circuit) -> Result<ProgramRequest> {
        match mode {
            ProgramType::Sampler => Ok(ProgramRequest::Sampler {
                options: SamplerOptions {
                    dynamical_decoupling: Some(self.config.dd_sequence()),
                },
            }),
            ProgramType::Estimator => Ok(ProgramRequest::Estimator {
                observable: parity_observable(adapted)?,
                options: EstimatorOptions {
                    resilience_level: self.config.resilience_level,
                },
            }),
        }
    }

    /// Store an image under a fresh key. Failures only cost the key.
    async fn cache_image(&self, bytes: Vec<u8>) -> Option<String> {
        let key = Uuid::new_v4().to_string();
        match self.cache.set(&key, bytes).await {
            Ok(()) => Some(key),
            Err(e) => {
                warn!(error = %e, "Failed to cache image");
                None
            }
        }
    }
}

/// Map a failed remote call during submission. A rejected credential clears
/// the connection.
fn remote_failure(ctx: &mut ConnectionContext, error: HalError, step: &str) -> OrchestratorError {
    if error.is_unauthorized() {
        warn!(step, "Credential rejected during submission; clearing connection");
        ctx.clear();
        OrchestratorError::InvalidCredential(error.to_string())
    } else {
        OrchestratorError::RemoteSubmissionError(error.to_string())
    }
}

/// Z-parity over every prefix of length 2..=k of the active qubits.
fn parity_observable(circuit: &Circuit) -> Result<Observable> {
    let active: Vec<u32> = circuit.active_qubits().into_iter().map(|q| q.0).collect();
    if active.len() < 2 {
        return Err(OrchestratorError::InsufficientQubits(active.len()));
    }
    let terms = (2..=active.len())
        .map(|len| PauliTerm::z_on(&active[..len], circuit.num_qubits(), 1.0))
        .collect();
    Ok(Observable::new(terms))
}
