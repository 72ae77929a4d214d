//! The orchestrator facade.
//!
//! Wires the job store, cache, monitor supervisor, submitter and status
//! poller together around one [`RemoteService`].

use std::sync::{Arc, Mutex, PoisonError};

use qhub_adapter_sim::StatevectorSimulator;
use qhub_hal::{LocalSimulator, RemoteService};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::cache::{
    CacheStorage, FileCacheStorage, MemoryCacheStorage, TtlCache, spawn_sweeper,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};
use crate::connection::{ConnectionContext, ConnectionManager};
use crate::error::Result;
use crate::job::JobRecord;
use crate::job_store::JobStore;
use crate::monitor::{MonitorDeps, MonitorSupervisor};
use crate::poller::StatusPoller;
use crate::render::{ArtifactRenderer, SvgRenderer};
use crate::results::ResultFormatter;
use crate::submitter::{JobSubmitter, SubmitRequest, Submission};

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    service: Arc<dyn RemoteService>,
    config: Config,
    simulator: Option<Arc<dyn LocalSimulator>>,
    renderer: Option<Arc<dyn ArtifactRenderer>>,
    cache_storage: Option<Arc<dyn CacheStorage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl OrchestratorBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_simulator(mut self, simulator: Arc<dyn LocalSimulator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Use `storage` instead of the backend named in the config.
    pub fn with_cache_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.cache_storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the orchestrator.
    ///
    /// The cache sweeper is only started when called inside a Tokio runtime.
    pub fn build(self) -> std::result::Result<Orchestrator, ConfigError> {
        let config = self.config;
        config.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let renderer: Arc<dyn ArtifactRenderer> = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(SvgRenderer::new()),
        };
        let simulator: Arc<dyn LocalSimulator> = match self.simulator {
            Some(simulator) => simulator,
            None => Arc::new(StatevectorSimulator::new()),
        };
        let storage: Arc<dyn CacheStorage> = match self.cache_storage {
            Some(storage) => storage,
            None if config.cache.backend == "file" => {
                Arc::new(FileCacheStorage::new(config.cache.resolved_directory()))
            }
            None => Arc::new(MemoryCacheStorage::new()),
        };

        let cache = Arc::new(TtlCache::new(storage, config.cache.ttl(), Arc::clone(&clock)));
        let store = Arc::new(JobStore::with_shards(config.store.shards));
        let supervisor = Arc::new(MonitorSupervisor::new(
            config.monitor.poll_interval(),
            config.monitor.max_concurrent_polls,
        ));
        let formatter = ResultFormatter::new(Arc::clone(&cache), Arc::clone(&renderer));
        let connections = ConnectionManager::new(self.service);

        let deps = MonitorDeps {
            store: Arc::clone(&store),
            formatter: formatter.clone(),
            clock: Arc::clone(&clock),
        };
        let submitter = JobSubmitter::new(
            Arc::clone(&cache),
            renderer,
            simulator,
            Arc::clone(&supervisor),
            deps,
            config.submission.clone(),
            config.queue.seconds_per_pending_job,
        );
        let poller = StatusPoller::new(
            connections.clone(),
            Arc::clone(&store),
            formatter,
            clock,
            config.queue.seconds_per_pending_job,
        );

        let sweeper = match (
            config.cache.sweep_interval(),
            tokio::runtime::Handle::try_current(),
        ) {
            (Some(interval), Ok(_)) => Some(spawn_sweeper(
                Arc::clone(&cache),
                interval,
                supervisor.cancellation_token(),
            )),
            _ => None,
        };

        info!(
            service = %connections.service_name(),
            cache = %config.cache.backend,
            "Orchestrator ready"
        );
        Ok(Orchestrator {
            config,
            connections,
            store,
            cache,
            submitter,
            poller,
            supervisor,
            sweeper: Mutex::new(sweeper),
        })
    }
}

/// Hardware job orchestrator.
///
/// All methods take `&self`; share it behind an `Arc`. Each caller keeps its
/// own [`ConnectionContext`].
pub struct Orchestrator {
    config: Config,
    connections: ConnectionManager,
    store: Arc<JobStore>,
    cache: Arc<TtlCache>,
    submitter: JobSubmitter,
    poller: StatusPoller,
    supervisor: Arc<MonitorSupervisor>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Start building an orchestrator around `service`.
    pub fn builder(service: Arc<dyn RemoteService>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            service,
            config: Config::default(),
            simulator: None,
            renderer: None,
            cache_storage: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Authenticate and record the operational targets in `ctx`.
    pub async fn connect(&self, ctx: &mut ConnectionContext, token: &str) -> Result<()> {
        self.connections.connect(ctx, token).await
    }

    /// Validate and dispatch a job, then monitor it in the background.
    pub async fn submit(
        &self,
        ctx: &mut ConnectionContext,
        request: SubmitRequest,
    ) -> Result<Submission> {
        self.submitter.submit(ctx, request).await
    }

    /// Current snapshot of a job, refreshed from the service if needed.
    pub async fn check_job_status(&self, ctx: &mut ConnectionContext, job_id: &str) -> JobRecord {
        self.poller.check_job_status(ctx, job_id).await
    }

    /// Stored snapshot of a job without contacting the service.
    pub fn job(&self, job_id: &str) -> Option<JobRecord> {
        self.store.get(job_id)
    }

    /// Every known job, ordered by id.
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.store.list()
    }

    pub async fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.get(key).await
    }

    pub async fn cache_set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        Ok(self.cache.set(key, value).await?)
    }

    /// Remove expired cache entries now.
    pub async fn clear_expired_cache(&self) -> Result<usize> {
        Ok(self.cache.clear_expired().await?)
    }

    /// Monitors still running.
    pub fn active_monitors(&self) -> usize {
        self.supervisor.active()
    }

    /// Stop every monitor and the cache sweeper, waiting for them to exit.
    /// Job records are left as last observed.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                debug!(error = %e, "Cache sweeper ended abnormally");
            }
        }
        info!(jobs = self.store.len(), "Orchestrator shut down");
    }
}
