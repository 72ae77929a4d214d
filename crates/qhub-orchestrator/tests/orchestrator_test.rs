//! End-to-end tests of the orchestrator against the simulated service.

mod support;

use std::sync::Arc;
use std::time::Duration;

use qhub_adapter_sim::{JobScript, ScriptedEnd, SimulatedService};
use qhub_hal::{Counts, HalError, HalResult, LocalSimulator, Target};
use qhub_ir::{Circuit, QubitId};
use qhub_orchestrator::cache::{CacheStorage, MemoryCacheStorage};
use qhub_orchestrator::{
    ArtifactRenderer, ConnectionContext, JobState, ManualClock, Orchestrator, OrchestratorError,
    ProgramType, RenderError, SubmitRequest,
};

use support::{TOKEN, connected, test_config, wait_terminal};

#[tokio::test(start_paused = true)]
async fn test_two_qubit_sampler_completes() {
    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let submission = orch
        .submit(
            &mut ctx,
            SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv").with_shots(1024),
        )
        .await
        .unwrap();
    assert_eq!(submission.comparison_counts.total(), 1024);
    assert!(!submission.circuit_diagram.is_empty());
    assert!(!submission.comparison_histogram.is_empty());
    assert_eq!(submission.queue_info.position, Some(0));

    let initial = orch.job(submission.job_id.as_str()).unwrap();
    assert!(!initial.is_terminal());

    tokio::time::sleep(Duration::from_secs(30)).await;

    let record = orch
        .check_job_status(&mut ctx, submission.job_id.as_str())
        .await;
    assert_eq!(record.status, JobState::Completed);
    assert!(record.error().is_none());
    let counts = record.hardware_counts().unwrap();
    assert!(counts.total() <= 1024);
    assert!(counts.iter().all(|(_, n)| n > 0));
    // A Bell pair only yields correlated outcomes.
    assert!(counts.iter().all(|(bits, _)| bits == "00" || bits == "11"));

    let artifacts = &record.artifacts;
    for key in [
        &artifacts.circuit_diagram,
        &artifacts.comparison_histogram,
        &artifacts.hardware_histogram,
        &artifacts.comparison_image,
    ] {
        let key = key.as_deref().expect("artifact key");
        assert!(orch.cache_get(key).await.is_some(), "{key} not cached");
    }

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_completed_status_is_idempotent() {
    let service = SimulatedService::new();
    service.set_script(JobScript::immediate());
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let job_id = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_brisbane"))
        .await
        .unwrap()
        .job_id;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let first = orch.check_job_status(&mut ctx, job_id.as_str()).await;
    let second = orch.check_job_status(&mut ctx, job_id.as_str()).await;
    assert_eq!(first.status, JobState::Completed);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_sampler_without_measurement_is_rejected() {
    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let mut circuit = Circuit::with_size("no_measure", 2, 0);
    circuit.h(QubitId(0)).unwrap();
    circuit.cx(QubitId(0), QubitId(1)).unwrap();

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(circuit, "sim_kyiv"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::MissingMeasurement));
    assert_eq!(service.submission_count(), 0);
    assert!(orch.jobs().is_empty());
}

#[tokio::test]
async fn test_estimator_needs_two_active_qubits() {
    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let mut circuit = Circuit::with_size("single", 3, 1);
    circuit.h(QubitId(0)).unwrap();
    circuit.measure(QubitId(0), qhub_ir::ClbitId(0)).unwrap();

    let err = orch
        .submit(
            &mut ctx,
            SubmitRequest::new(circuit, "sim_kyiv").with_mode(ProgramType::Estimator),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InsufficientQubits(1)));
    assert_eq!(service.submission_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_estimator_on_shifted_layout() {
    let service = SimulatedService::new().with_layout_offset(7);
    service.set_script(JobScript::immediate());
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let job_id = orch
        .submit(
            &mut ctx,
            SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv")
                .with_mode(ProgramType::Estimator),
        )
        .await
        .unwrap()
        .job_id;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let record = orch.check_job_status(&mut ctx, job_id.as_str()).await;
    assert_eq!(record.program_type, Some(ProgramType::Estimator));
    let value = record.expectation_value().unwrap();
    assert!((value - 1.0).abs() < 1e-9, "⟨ZZ⟩ = {value}");
    assert!(record.artifacts.hardware_histogram.is_none());
}

#[tokio::test]
async fn test_target_validation() {
    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::ghz(6).unwrap(), "sim_nazca"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::CircuitTooLarge {
            required: 6,
            available: 5,
            ..
        }
    ));

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_osaka"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::UnknownTarget(_)));

    let err = orch
        .submit(
            &mut ctx,
            SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv").with_shots(50_000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::LocalSimulationFailed(_)));
    assert_eq!(service.submission_count(), 0);
}

#[tokio::test]
async fn test_submit_requires_connection() {
    let orch = Orchestrator::builder(Arc::new(SimulatedService::new()))
        .with_config(test_config(5000))
        .build()
        .unwrap();
    let mut ctx = ConnectionContext::new();
    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotConnected));
}

#[tokio::test]
async fn test_invalid_token_leaves_empty_context() {
    let service = SimulatedService::new().with_accepted_tokens([TOKEN]);
    let orch = Orchestrator::builder(Arc::new(service))
        .with_config(test_config(5000))
        .build()
        .unwrap();
    let mut ctx = ConnectionContext::new();

    let err = orch.connect(&mut ctx, "wrong-token-999999").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidCredential(_)));
    assert!(!ctx.is_connected());
    assert!(!ctx.has_token());
    assert!(ctx.targets().is_empty());
}

#[tokio::test]
async fn test_revoked_credential_blocks_submission() {
    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;
    service.set_credentials_revoked(true);

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidCredential(_)));
    assert!(!ctx.has_token());
    assert!(!ctx.is_connected());
    assert!(ctx.targets().is_empty());
    assert_eq!(service.submission_count(), 0);

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NotConnected));
}

#[tokio::test]
async fn test_queue_estimate_uses_current_backlog() {
    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;
    service.set_pending_jobs("sim_kyiv", 7);

    let submission = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap();
    assert_eq!(submission.queue_info.position, Some(7));
    assert_eq!(submission.queue_info.estimated_wait_seconds, Some(70));

    let record = orch.job(submission.job_id.as_str()).unwrap();
    assert_eq!(record.queue_info.unwrap().position, Some(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_are_isolated() {
    let service = SimulatedService::with_targets(vec![Target::new("sim_wide", 27)]);
    service.set_script(JobScript::immediate());
    let orch = Arc::new(
        Orchestrator::builder(Arc::new(service.clone()))
            .with_config(test_config(10))
            .build()
            .unwrap(),
    );

    let tasks: Vec<_> = (0..100u32)
        .map(|i| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                let mut ctx = ConnectionContext::new();
                orch.connect(&mut ctx, TOKEN).await.unwrap();
                let shots = 100 + i;
                let submission = orch
                    .submit(
                        &mut ctx,
                        SubmitRequest::new(Circuit::ghz(1 + i % 3).unwrap(), "sim_wide")
                            .with_shots(shots),
                    )
                    .await
                    .unwrap();
                let record =
                    wait_terminal(&orch, &mut ctx, submission.job_id.as_str(), Duration::from_secs(30))
                        .await;
                (submission.job_id, shots, record)
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        let (job_id, shots, record) = task.await.unwrap();
        assert!(ids.insert(job_id.clone()), "duplicate job id {job_id}");
        assert_eq!(record.job_id, job_id);
        assert_eq!(record.shots, Some(shots));
        assert_eq!(record.status, JobState::Completed);
        assert_eq!(record.hardware_counts().unwrap().total(), u64::from(shots));
    }
    assert_eq!(ids.len(), 100);
    assert_eq!(orch.jobs().len(), 100);
    assert_eq!(service.submission_count(), 100);

    orch.shutdown().await;
    assert_eq!(orch.active_monitors(), 0);
}

#[tokio::test]
async fn test_cache_ttl_expiry_removes_entry() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let clock = Arc::new(ManualClock::default());
    let orch = Orchestrator::builder(Arc::new(SimulatedService::new()))
        .with_config(test_config(5000))
        .with_cache_storage(storage.clone())
        .with_clock(clock.clone())
        .build()
        .unwrap();

    orch.cache_set("diagram", b"<svg/>".to_vec()).await.unwrap();
    clock.advance(chrono::Duration::seconds(3599));
    assert!(orch.cache_get("diagram").await.is_some());

    clock.advance(chrono::Duration::seconds(1));
    assert!(orch.cache_get("diagram").await.is_none());
    assert!(storage.read("diagram").await.unwrap().is_none());
}

#[tokio::test]
async fn test_clear_expired_cache_counts_removed() {
    let clock = Arc::new(ManualClock::default());
    let orch = Orchestrator::builder(Arc::new(SimulatedService::new()))
        .with_config(test_config(5000))
        .with_clock(clock.clone())
        .build()
        .unwrap();

    orch.cache_set("old_a", vec![1]).await.unwrap();
    orch.cache_set("old_b", vec![2]).await.unwrap();
    clock.advance(chrono::Duration::seconds(1800));
    orch.cache_set("fresh", vec![3]).await.unwrap();
    clock.advance(chrono::Duration::seconds(1800));

    assert_eq!(orch.clear_expired_cache().await.unwrap(), 2);
    assert_eq!(orch.cache_get("fresh").await, Some(vec![3]));
    assert_eq!(orch.clear_expired_cache().await.unwrap(), 0);
}

struct BrokenRenderer;

impl ArtifactRenderer for BrokenRenderer {
    fn circuit_diagram(&self, _circuit: &Circuit) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::EmptyCircuit)
    }

    fn histogram(&self, _title: &str, _counts: &Counts) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::EmptyHistogram)
    }

    fn comparison(&self, _hardware: &Counts, _local: &Counts) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::EmptyHistogram)
    }
}

struct BrokenSimulator;

impl LocalSimulator for BrokenSimulator {
    fn run(&self, _circuit: &Circuit, _shots: u32) -> HalResult<Counts> {
        Err(HalError::Unsupported("engine offline".into()))
    }
}

#[tokio::test]
async fn test_local_failures_stop_before_dispatch() {
    let service = SimulatedService::new();
    let orch = Orchestrator::builder(Arc::new(service.clone()))
        .with_config(test_config(5000))
        .with_renderer(Arc::new(BrokenRenderer))
        .build()
        .unwrap();
    let mut ctx = ConnectionContext::new();
    orch.connect(&mut ctx, TOKEN).await.unwrap();

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::RenderingFailed(_)));

    let orch = Orchestrator::builder(Arc::new(service.clone()))
        .with_config(test_config(5000))
        .with_simulator(Arc::new(BrokenSimulator))
        .build()
        .unwrap();
    let mut ctx = ConnectionContext::new();
    orch.connect(&mut ctx, TOKEN).await.unwrap();

    let err = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::LocalSimulationFailed(msg) => assert!(msg.contains("engine offline")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.submission_count(), 0);
}

#[tokio::test]
async fn test_file_cache_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(5000);
    config.cache.backend = "file".to_string();
    config.cache.directory = Some(dir.path().to_path_buf());

    let service = SimulatedService::new();
    let (orch, mut ctx) = connected(&service, config).await;
    let submission = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap();

    let key = submission.artifacts.circuit_diagram.unwrap();
    assert!(dir.path().join(format!("{key}.json")).exists());
    assert_eq!(
        orch.cache_get(&key).await.unwrap(),
        submission.circuit_diagram
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_cancellation_fails_job() {
    let service = SimulatedService::new();
    service.set_script(JobScript {
        queued_polls: 1,
        running_polls: 0,
        end: ScriptedEnd::Cancelled,
    });
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    let job_id = orch
        .submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
        .await
        .unwrap()
        .job_id;
    tokio::time::sleep(Duration::from_secs(20)).await;

    let record = orch.job(job_id.as_str()).unwrap();
    assert_eq!(record.error(), Some("Job failed: CANCELLED"));
    assert!(record.outcome.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_monitors() {
    let service = SimulatedService::new();
    service.set_script(JobScript {
        queued_polls: 10_000,
        running_polls: 0,
        end: ScriptedEnd::Done,
    });
    let (orch, mut ctx) = connected(&service, test_config(5000)).await;

    for _ in 0..3 {
        orch.submit(&mut ctx, SubmitRequest::new(Circuit::bell().unwrap(), "sim_kyiv"))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(orch.active_monitors(), 3);

    orch.shutdown().await;
    assert_eq!(orch.active_monitors(), 0);
    assert!(orch.jobs().iter().all(|r| r.status == JobState::OnQueue));
}
