//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use qhub_adapter_sim::SimulatedService;
use qhub_orchestrator::{Config, ConnectionContext, JobRecord, Orchestrator};

pub const TOKEN: &str = "test-token-0123456789";

/// Configuration with the sweeper off and a given poll interval.
pub fn test_config(poll_interval_ms: u64) -> Config {
    let mut config = Config::default();
    config.monitor.poll_interval_ms = poll_interval_ms;
    config.cache.sweep_interval_seconds = 0;
    config
}

/// An orchestrator over `service`, plus a connected context.
pub async fn connected(
    service: &SimulatedService,
    config: Config,
) -> (Orchestrator, ConnectionContext) {
    let orchestrator = Orchestrator::builder(Arc::new(service.clone()))
        .with_config(config)
        .build()
        .unwrap();
    let mut ctx = ConnectionContext::new();
    orchestrator.connect(&mut ctx, TOKEN).await.unwrap();
    (orchestrator, ctx)
}

/// Poll `check_job_status` until the job is terminal or `timeout` passes.
pub async fn wait_terminal(
    orchestrator: &Orchestrator,
    ctx: &mut ConnectionContext,
    job_id: &str,
    timeout: Duration,
) -> JobRecord {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let record = orchestrator.check_job_status(ctx, job_id).await;
        if record.is_terminal() || tokio::time::Instant::now() >= deadline {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
