//! Targets command implementation.

use anyhow::Result;
use console::style;

use qhub_orchestrator::Config;

use super::common::connect;

/// Execute the targets command.
pub async fn execute(config: Config, token: &str) -> Result<()> {
    let seconds_per_job = config.queue.seconds_per_pending_job;
    let (orchestrator, ctx) = connect(config, token).await?;

    println!("{} Operational targets:\n", style("QHub").cyan().bold());

    for available in ctx.targets() {
        let target = &available.target;
        println!(
            "  {} {}",
            if target.pending_jobs == 0 {
                style("●").green()
            } else {
                style("●").yellow()
            },
            style(&target.id).bold()
        );
        println!("    Qubits: {}", target.num_qubits);
        println!(
            "    Queue: {} pending (~{}s wait)",
            target.pending_jobs,
            u64::from(target.pending_jobs) * seconds_per_job
        );
        println!();
    }

    orchestrator.shutdown().await;
    Ok(())
}
