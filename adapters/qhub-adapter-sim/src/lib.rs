//! QHub local simulation
//!
//! Two pieces built on one statevector engine:
//!
//! - [`StatevectorSimulator`], the [`LocalSimulator`](qhub_hal::LocalSimulator)
//!   used for synchronous comparison runs;
//! - [`SimulatedService`], an in-process
//!   [`RemoteService`](qhub_hal::RemoteService) with targets, queues and a
//!   scripted job lifecycle, used by the CLI and by tests.
//!
//! # Performance
//!
//! | Qubits | Memory |
//! |--------|--------|
//! | 10 | ~16 KB |
//! | 15 | ~512 KB |
//! | 20 | ~16 MB |
//!
//! The remote stand-in only simulates the qubits a circuit actually touches,
//! so small circuits mapped onto wide devices stay cheap.

mod service;
mod simulator;
mod statevector;

pub use service::{JobScript, ScriptedEnd, SimulatedService};
pub use simulator::StatevectorSimulator;
pub use statevector::Statevector;
