//! In-process remote execution service.
//!
//! [`SimulatedService`] behaves like a cloud provider from the orchestrator's
//! point of view: it checks credentials, reports a fleet of targets with
//! queues, remaps circuits onto physical qubits and walks every job through
//! a scripted `Queued → Running → terminal` lifecycle, one step per status
//! poll. Results are computed with the statevector simulator at submission.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument};
use uuid::Uuid;

use qhub_hal::{
    HalError, HalResult, LocalSimulator, ProgramPayload, ProgramRequest, RemoteJobId,
    RemoteJobStatus, RemoteService, ServiceHandle, Target,
};
use qhub_ir::{Circuit, Instruction, QubitId};

use crate::simulator::StatevectorSimulator;

/// How a job ends once its queued and running polls are used up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEnd {
    /// Finish with a result.
    Done,
    /// Report cancellation.
    Cancelled,
    /// Report a service-side failure.
    Error(String),
}

/// Lifecycle every new job follows.
#[derive(Debug, Clone)]
pub struct JobScript {
    /// Polls answered with `Queued`.
    pub queued_polls: u32,
    /// Polls answered with `Running` after the queued ones.
    pub running_polls: u32,
    /// Terminal state reported afterwards.
    pub end: ScriptedEnd,
}

impl Default for JobScript {
    fn default() -> Self {
        Self {
            queued_polls: 1,
            running_polls: 1,
            end: ScriptedEnd::Done,
        }
    }
}

impl JobScript {
    /// Jobs that are done on the first poll.
    pub fn immediate() -> Self {
        Self {
            queued_polls: 0,
            running_polls: 0,
            end: ScriptedEnd::Done,
        }
    }

    fn status_after(&self, polls: u32) -> RemoteJobStatus {
        if polls <= self.queued_polls {
            RemoteJobStatus::Queued
        } else if polls <= self.queued_polls + self.running_polls {
            RemoteJobStatus::Running
        } else {
            match &self.end {
                ScriptedEnd::Done => RemoteJobStatus::Done,
                ScriptedEnd::Cancelled => RemoteJobStatus::Cancelled,
                ScriptedEnd::Error(msg) => RemoteJobStatus::Error(msg.clone()),
            }
        }
    }
}

struct SimJob {
    target: String,
    polls: u32,
    script: JobScript,
    payload: ProgramPayload,
}

struct Shared {
    accepted_tokens: FxHashSet<String>,
    targets: RwLock<Vec<Target>>,
    script: Mutex<JobScript>,
    jobs: Mutex<FxHashMap<String, SimJob>>,
    simulator: StatevectorSimulator,
    layout_offset: u32,
    submissions: AtomicU64,
    fail_queries: AtomicBool,
    credentials_revoked: AtomicBool,
}

/// In-process stand-in for a quantum cloud.
#[derive(Clone)]
pub struct SimulatedService {
    shared: Arc<Shared>,
}

impl SimulatedService {
    /// A service with a small default fleet that accepts any non-empty token.
    pub fn new() -> Self {
        Self::with_targets(vec![
            Target::new("sim_brisbane", 127).with_pending_jobs(3),
            Target::new("sim_kyiv", 127),
            Target::new("sim_nazca", 5).with_pending_jobs(1),
            Target::new("sim_osaka", 127).offline(),
        ])
    }

    /// A service exposing exactly `targets`.
    pub fn with_targets(targets: Vec<Target>) -> Self {
        Self {
            shared: Arc::new(Shared {
                accepted_tokens: FxHashSet::default(),
                targets: RwLock::new(targets),
                script: Mutex::new(JobScript::default()),
                jobs: Mutex::new(FxHashMap::default()),
                simulator: StatevectorSimulator::new(),
                layout_offset: 0,
                submissions: AtomicU64::new(0),
                fail_queries: AtomicBool::new(false),
                credentials_revoked: AtomicBool::new(false),
            }),
        }
    }

    /// Only accept the listed tokens.
    ///
    /// Must be called before the service is shared.
    pub fn with_accepted_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.accepted_tokens = tokens.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Shift logical qubit `i` to physical qubit `(i + offset) mod n` during adaptation.
    ///
    /// Must be called before the service is shared.
    pub fn with_layout_offset(mut self, offset: u32) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.layout_offset = offset;
        }
        self
    }

    /// Lifecycle for jobs submitted from now on.
    pub fn set_script(&self, script: JobScript) {
        *self
            .shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = script;
    }

    /// Change the queue depth reported for `target_id`.
    pub fn set_pending_jobs(&self, target_id: &str, pending_jobs: u32) {
        let mut targets = self
            .shared
            .targets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(target) = targets.iter_mut().find(|t| t.id == target_id) {
            target.pending_jobs = pending_jobs;
        }
    }

    /// Make status and result queries fail with a network error.
    pub fn set_fail_queries(&self, fail: bool) {
        self.shared.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make every call on existing handles fail as unauthorized.
    pub fn set_credentials_revoked(&self, revoked: bool) {
        self.shared.credentials_revoked.store(revoked, Ordering::SeqCst);
    }

    /// Number of jobs accepted so far.
    pub fn submission_count(&self) -> u64 {
        self.shared.submissions.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteService for SimulatedService {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "simulated"
    }

    async fn authenticate(&self, token: &str) -> HalResult<Arc<dyn ServiceHandle>> {
        let accepted = if self.shared.accepted_tokens.is_empty() {
            !token.is_empty()
        } else {
            self.shared.accepted_tokens.contains(token)
        };
        if !accepted {
            return Err(HalError::Unauthorized(
                "401 Client Error: invalid API token".into(),
            ));
        }
        Ok(Arc::new(SimulatedHandle {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct SimulatedHandle {
    shared: Arc<Shared>,
}

impl SimulatedHandle {
    fn check_credentials(&self) -> HalResult<()> {
        if self.shared.credentials_revoked.load(Ordering::SeqCst) {
            return Err(HalError::Unauthorized("401 Client Error: token expired".into()));
        }
        Ok(())
    }

    fn check_queries(&self) -> HalResult<()> {
        self.check_credentials()?;
        if self.shared.fail_queries.load(Ordering::SeqCst) {
            return Err(HalError::Network("connection reset by peer".into()));
        }
        Ok(())
    }

    fn execute(
        &self,
        circuit: &Circuit,
        program: &ProgramRequest,
        shots: u32,
    ) -> HalResult<ProgramPayload> {
        let (compact, dense) = compact(circuit)?;
        match program {
            ProgramRequest::Sampler { .. } => {
                Ok(ProgramPayload::Counts(self.shared.simulator.run(&compact, shots)?))
            }
            ProgramRequest::Estimator { observable, .. } => {
                let sv = self.shared.simulator.evolve(&compact)?;
                let value = observable
                    .terms
                    .iter()
                    .map(|term| {
                        // Idle physical qubits stay in |0⟩ and contribute +1.
                        let mask = term
                            .support()
                            .into_iter()
                            .filter_map(|p| dense.get(&p))
                            .fold(0usize, |m, &d| m | (1 << d));
                        term.coefficient * sv.expectation_z(mask)
                    })
                    .sum();
                Ok(ProgramPayload::Expectation(value))
            }
        }
    }
}

/// Relabel the touched physical qubits onto `0..k` so a wide device circuit
/// can be simulated. Returns the compacted circuit and physical → dense map.
fn compact(circuit: &Circuit) -> HalResult<(Circuit, FxHashMap<u32, u32>)> {
    let dense: FxHashMap<u32, u32> = circuit
        .active_qubits()
        .into_iter()
        .enumerate()
        .map(|(d, p)| (p.0, d as u32))
        .collect();
    let mut out = Circuit::with_size(circuit.name(), dense.len() as u32, circuit.num_clbits());
    for inst in circuit.instructions() {
        let qubits: Vec<QubitId> = inst
            .qubits
            .iter()
            .filter_map(|q| dense.get(&q.0).map(|&d| QubitId(d)))
            .collect();
        if inst.is_barrier() {
            if !qubits.is_empty() {
                out.apply(Instruction::barrier(qubits))
                    .map_err(|e| HalError::InvalidCircuit(e.to_string()))?;
            }
            continue;
        }
        let mut mapped = inst.clone();
        mapped.qubits = qubits;
        out.apply(mapped)
            .map_err(|e| HalError::InvalidCircuit(e.to_string()))?;
    }
    Ok((out, dense))
}

#[async_trait]
impl ServiceHandle for SimulatedHandle {
    async fn list_targets(&self) -> HalResult<Vec<Target>> {
        self.check_credentials()?;
        Ok(self
            .shared
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn adapt_circuit(&self, circuit: &Circuit, target: &Target) -> HalResult<Circuit> {
        self.check_credentials()?;
        let offset = self.shared.layout_offset;
        // Shifted qubits wrap around the device, keeping the layout a permutation.
        let layout: Vec<u32> = (0..circuit.num_qubits())
            .map(|i| (i + offset).checked_rem(target.num_qubits).unwrap_or(i))
            .collect();
        circuit
            .remap(&layout, target.num_qubits)
            .map_err(|e| HalError::InvalidCircuit(e.to_string()))
    }

    #[instrument(skip(self, circuit, program), fields(target = %target.id))]
    async fn submit(
        &self,
        target: &Target,
        circuit: &Circuit,
        program: ProgramRequest,
        shots: u32,
    ) -> HalResult<RemoteJobId> {
        self.check_credentials()?;
        let known = self
            .shared
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|t| t.id == target.id && t.operational);
        if !known {
            return Err(HalError::TargetNotFound(target.id.clone()));
        }
        let payload = self.execute(circuit, &program, shots)?;
        let script = self
            .shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let job_id = RemoteJobId::new(format!("sim-{}", Uuid::new_v4()));
        self.shared
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                job_id.0.clone(),
                SimJob {
                    target: target.id.clone(),
                    polls: 0,
                    script,
                    payload,
                },
            );
        self.shared.submissions.fetch_add(1, Ordering::SeqCst);
        debug!(job_id = %job_id, "Accepted job");
        Ok(job_id)
    }

    async fn poll_status(&self, job_id: &RemoteJobId) -> HalResult<RemoteJobStatus> {
        self.check_queries()?;
        let mut jobs = self
            .shared
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        job.polls = job.polls.saturating_add(1);
        Ok(job.script.status_after(job.polls))
    }

    async fn fetch_result(&self, job_id: &RemoteJobId) -> HalResult<ProgramPayload> {
        self.check_queries()?;
        let jobs = self
            .shared
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        if job.script.status_after(job.polls) != RemoteJobStatus::Done {
            return Err(HalError::ResultNotReady(job_id.0.clone()));
        }
        Ok(job.payload.clone())
    }

    async fn job_target(&self, job_id: &RemoteJobId) -> HalResult<String> {
        self.check_queries()?;
        self.shared
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id.0)
            .map(|j| j.target.clone())
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qhub_hal::{EstimatorOptions, Observable, PauliTerm, SamplerOptions};

    fn sampler() -> ProgramRequest {
        ProgramRequest::Sampler {
            options: SamplerOptions::default(),
        }
    }

    async fn handle(service: &SimulatedService) -> Arc<dyn ServiceHandle> {
        service.authenticate("token").await.unwrap()
    }

    #[tokio::test]
    async fn test_rejects_unknown_token() {
        let service = SimulatedService::new().with_accepted_tokens(["good"]);
        let err = service.authenticate("bad").await.err().unwrap();
        assert!(err.is_unauthorized());
        assert!(service.authenticate("good").await.is_ok());
    }

    #[tokio::test]
    async fn test_lifecycle_advances_per_poll() {
        let service = SimulatedService::new();
        let handle = handle(&service).await;
        let target = Target::new("sim_kyiv", 127);
        let adapted = handle
            .adapt_circuit(&Circuit::bell().unwrap(), &target)
            .await
            .unwrap();
        let job = handle.submit(&target, &adapted, sampler(), 100).await.unwrap();

        assert!(matches!(
            handle.fetch_result(&job).await,
            Err(HalError::ResultNotReady(_))
        ));
        assert_eq!(handle.poll_status(&job).await.unwrap(), RemoteJobStatus::Queued);
        assert_eq!(handle.poll_status(&job).await.unwrap(), RemoteJobStatus::Running);
        assert_eq!(handle.poll_status(&job).await.unwrap(), RemoteJobStatus::Done);
        assert_eq!(handle.job_target(&job).await.unwrap(), "sim_kyiv");

        let ProgramPayload::Counts(counts) = handle.fetch_result(&job).await.unwrap() else {
            panic!("expected counts");
        };
        assert_eq!(counts.total(), 100);
        assert_eq!(counts.get("00") + counts.get("11"), 100);
        assert_eq!(service.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_layout_offset_and_estimator() {
        let service = SimulatedService::new().with_layout_offset(3);
        service.set_script(JobScript::immediate());
        let handle = handle(&service).await;
        let target = Target::new("sim_nazca", 5);

        let mut circuit = Circuit::with_size("bell_nomeas", 2, 0);
        circuit.h(QubitId(0)).unwrap().cx(QubitId(0), QubitId(1)).unwrap();
        let adapted = handle.adapt_circuit(&circuit, &target).await.unwrap();
        assert_eq!(adapted.active_qubits(), vec![QubitId(3), QubitId(4)]);

        let program = ProgramRequest::Estimator {
            observable: Observable::new(vec![PauliTerm::z_on(&[3, 4], 5, 1.0)]),
            options: EstimatorOptions::default(),
        };
        let job = handle.submit(&target, &adapted, program, 1).await.unwrap();
        assert_eq!(handle.poll_status(&job).await.unwrap(), RemoteJobStatus::Done);
        let ProgramPayload::Expectation(value) = handle.fetch_result(&job).await.unwrap() else {
            panic!("expected expectation value");
        };
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_layout_offset_wraps_full_width_circuit() {
        let service = SimulatedService::new().with_layout_offset(2);
        let handle = handle(&service).await;
        let target = Target::new("sim_nazca", 5);

        let adapted = handle
            .adapt_circuit(&Circuit::ghz(5).unwrap(), &target)
            .await
            .unwrap();
        assert_eq!(adapted.num_qubits(), 5);
        assert_eq!(adapted.active_qubits().len(), 5);
        // Logical 0 lands on physical 2, logical 4 wraps to physical 1.
        assert_eq!(adapted.instructions()[0].qubits, vec![QubitId(2)]);
    }

    #[tokio::test]
    async fn test_pending_jobs_can_change() {
        let service = SimulatedService::new();
        let handle = handle(&service).await;
        service.set_pending_jobs("sim_kyiv", 9);

        let targets = handle.list_targets().await.unwrap();
        let kyiv = targets.iter().find(|t| t.id == "sim_kyiv").unwrap();
        assert_eq!(kyiv.pending_jobs, 9);
    }

    #[tokio::test]
    async fn test_revoked_credentials() {
        let service = SimulatedService::new();
        let handle = handle(&service).await;
        service.set_credentials_revoked(true);
        assert!(handle.list_targets().await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn test_failed_queries() {
        let service = SimulatedService::new();
        service.set_fail_queries(true);
        let handle = handle(&service).await;
        let err = handle
            .poll_status(&RemoteJobId::from("sim-x"))
            .await
            .unwrap_err();
        assert!(matches!(err, HalError::Network(_)));
        assert!(!err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_offline_target_rejected() {
        let service = SimulatedService::new();
        let handle = handle(&service).await;
        let offline = Target::new("sim_osaka", 127);
        let err = handle
            .submit(&offline, &Circuit::bell().unwrap(), sampler(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, HalError::TargetNotFound(_)));
        assert_eq!(service.submission_count(), 0);
    }
}
