//! Run command implementation.
//!
//! Submit a circuit, then poll its status until it reaches a terminal state.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use qhub_orchestrator::{
    Config, ConnectionContext, JobRecord, JobState, Orchestrator, ProgramOutcome, ProgramType,
    SubmitRequest,
};

use super::common::{connect, load_circuit_file, load_library_circuit, print_counts};

/// Status checks while waiting are at most this far apart.
const MAX_WAIT_STEP: Duration = Duration::from_secs(2);

/// Where the circuit comes from.
pub enum CircuitSource {
    Library(String),
    File(PathBuf),
}

pub struct RunArgs {
    pub source: CircuitSource,
    pub target: String,
    pub shots: Option<u32>,
    pub mode: String,
    pub token: String,
    pub timeout: u64,
    pub json: bool,
}

/// Execute the run command.
pub async fn execute(config: Config, args: RunArgs) -> Result<()> {
    let mode: ProgramType = args.mode.parse()?;

    let (circuit, source_code) = match &args.source {
        CircuitSource::Library(name) => (load_library_circuit(name)?, None),
        CircuitSource::File(path) => {
            let (circuit, source) = load_circuit_file(path)?;
            (circuit, Some(source))
        }
    };

    let shots = args.shots.unwrap_or(config.submission.default_shots);
    let step = config.monitor.poll_interval().min(MAX_WAIT_STEP);

    println!(
        "{} Running {} on {} ({} mode, {} shots)",
        style("→").cyan().bold(),
        style(circuit.name()).green(),
        style(&args.target).yellow(),
        mode,
        shots
    );
    println!(
        "  Loaded: {} qubits, depth {}",
        circuit.num_qubits(),
        circuit.depth()
    );

    let (orchestrator, mut ctx) = connect(config, &args.token).await?;

    let mut request = SubmitRequest::new(circuit, args.target.as_str())
        .with_mode(mode)
        .with_shots(shots);
    if let Some(source) = source_code {
        request = request.with_source_code(source);
    }

    let result = submit_and_wait(&orchestrator, &mut ctx, request, step, &args).await;
    orchestrator.shutdown().await;
    result
}

async fn submit_and_wait(
    orchestrator: &Orchestrator,
    ctx: &mut ConnectionContext,
    request: SubmitRequest,
    step: Duration,
    args: &RunArgs,
) -> Result<()> {
    let submission = orchestrator.submit(ctx, request).await?;
    let job_id = submission.job_id.to_string();

    println!("  Job: {}", style(&job_id).dim());
    if let (Some(position), Some(wait)) = (
        submission.queue_info.position,
        submission.queue_info.estimated_wait_seconds,
    ) {
        println!("  Queue: {position} jobs ahead (~{wait}s)");
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Waiting for job to complete...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let timeout = Duration::from_secs(args.timeout);

    let record = loop {
        let record = orchestrator.check_job_status(ctx, &job_id).await;

        if is_settled(&record, orchestrator.job(&job_id).as_ref()) {
            break record;
        }
        match &record.status {
            JobState::Failed(reason) => spinner.set_message(format!("Retrying: {reason}")),
            status => spinner.set_message(format!("Status: {} ...", status.name())),
        }

        if start.elapsed() > timeout {
            spinner.finish_and_clear();
            anyhow::bail!(
                "Timeout after {}s. Job {} is still {}.",
                args.timeout,
                job_id,
                record.status.name()
            );
        }

        tokio::time::sleep(step).await;
    };
    spinner.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return finish(&record);
    }

    match &record.outcome {
        Some(ProgramOutcome::Sampler { hardware_counts }) => {
            print_counts(hardware_counts, record.comparison_counts.as_ref());
        }
        Some(ProgramOutcome::Estimator { expectation_value }) => {
            println!(
                "\n{} Expectation value: {}",
                style("✓").green().bold(),
                style(format!("{expectation_value:.6}")).cyan()
            );
        }
        None => {}
    }

    let artifacts = &record.artifacts;
    for (label, key) in [
        ("circuit diagram", &artifacts.circuit_diagram),
        ("hardware histogram", &artifacts.hardware_histogram),
        ("comparison", &artifacts.comparison_image),
    ] {
        if let Some(key) = key {
            println!("  {} {}", style(format!("{label}:")).dim(), key);
        }
    }

    finish(&record)
}

/// Whether `snapshot` ends the wait. A failed snapshot whose stored record
/// is still open came from a query problem, not from the job.
fn is_settled(snapshot: &JobRecord, stored: Option<&JobRecord>) -> bool {
    match snapshot.status {
        JobState::Failed(_) => stored.is_none_or(JobRecord::is_terminal),
        ref status => status.is_terminal(),
    }
}

fn finish(record: &JobRecord) -> Result<()> {
    match &record.status {
        JobState::Failed(reason) => anyhow::bail!("Job {} failed: {}", record.job_id, reason),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn open_job() -> JobRecord {
        JobRecord::placeholder("job-1".into(), Utc::now())
    }

    #[test]
    fn test_query_failure_keeps_waiting() {
        let stored = open_job();
        let snapshot = stored.failed_snapshot("Connection lost", Utc::now());
        assert!(!is_settled(&snapshot, Some(&stored)));
    }

    #[test]
    fn test_stored_failure_ends_wait() {
        let stored = open_job().failed_snapshot("Job failed: ERROR", Utc::now());
        assert!(is_settled(&stored, Some(&stored)));
        assert!(is_settled(&stored, None));
    }

    #[test]
    fn test_open_and_completed_snapshots() {
        let mut record = open_job();
        assert!(!is_settled(&record, Some(&record)));

        record.status = JobState::Executing;
        assert!(!is_settled(&record, Some(&record)));

        record.status = JobState::Completed;
        assert!(is_settled(&record, Some(&record)));
    }
}
