//! QHub hardware job orchestration
//!
//! Submits circuits to a remote quantum execution service, tracks the
//! resulting jobs in the background and answers status queries, while a
//! local simulation of each circuit is kept for comparison.
//!
//! ```text
//!   connect ──→ ConnectionContext ──→ submit ──→ JobStore ←── monitor (background)
//!                                                  ↑
//!                                   check_job_status (on demand)
//! ```
//!
//! Images derived from jobs (circuit diagrams, histograms) live in a
//! time-to-live cache referenced from each job record.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use qhub_adapter_sim::SimulatedService;
//! use qhub_ir::Circuit;
//! use qhub_orchestrator::{ConnectionContext, Orchestrator, SubmitRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::builder(Arc::new(SimulatedService::new())).build()?;
//! let mut ctx = ConnectionContext::new();
//! orchestrator.connect(&mut ctx, "my-api-token").await?;
//!
//! let submission = orchestrator
//!     .submit(&mut ctx, SubmitRequest::new(Circuit::bell()?, "sim_kyiv").with_shots(1024))
//!     .await?;
//! let record = orchestrator
//!     .check_job_status(&mut ctx, submission.job_id.as_str())
//!     .await;
//! println!("{}", record.status);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod job;
pub mod job_store;
pub mod monitor;
pub mod orchestrator;
pub mod poller;
pub mod render;
pub mod results;
pub mod submitter;
pub mod tracing_config;

pub use cache::{CacheError, CacheResult, FileCacheStorage, MemoryCacheStorage, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use connection::{AvailableTarget, ConnectionContext, ConnectionManager};
pub use error::{OrchestratorError, Result};
pub use job::{Artifacts, JobRecord, JobState, ProgramOutcome, ProgramType, QueueInfo};
pub use job_store::JobStore;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use render::{ArtifactRenderer, RenderError, SvgRenderer};
pub use submitter::{SubmitRequest, Submission};
