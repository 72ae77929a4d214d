//! QHub remote execution contract
//!
//! The orchestrator never talks to a concrete quantum cloud. It talks to the
//! traits in this crate:
//!
//! - [`RemoteService`] authenticates a credential and yields a
//!   [`ServiceHandle`];
//! - a [`ServiceHandle`] lists [`Target`]s, adapts circuits to them, submits
//!   [`ProgramRequest`]s and reports [`RemoteJobStatus`] and
//!   [`ProgramPayload`]s;
//! - a [`LocalSimulator`] produces the comparison [`Counts`] on the host.
//!
//! # Implementing a service
//!
//! ```ignore
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use qhub_hal::{HalError, HalResult, RemoteService, ServiceHandle};
//!
//! struct MyCloud;
//!
//! #[async_trait]
//! impl RemoteService for MyCloud {
//!     fn name(&self) -> &str { "my_cloud" }
//!
//!     async fn authenticate(&self, token: &str) -> HalResult<Arc<dyn ServiceHandle>> {
//!         // Exchange the token for a session; map HTTP 401 to HalError::Unauthorized.
//!         # todo!()
//!     }
//! }
//! ```

pub mod counts;
pub mod error;
pub mod job;
pub mod program;
pub mod service;
pub mod target;

pub use counts::Counts;
pub use error::{HalError, HalResult};
pub use job::{RemoteJobId, RemoteJobStatus};
pub use program::{
    DdSequence, EstimatorOptions, Observable, PauliTerm, ProgramPayload, ProgramRequest,
    SamplerOptions,
};
pub use service::{LocalSimulator, RemoteService, ServiceHandle};
pub use target::Target;
