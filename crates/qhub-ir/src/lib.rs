//! QHub circuit model
//!
//! A deliberately flat representation of a quantum circuit: a fixed number of
//! qubits and classical bits plus an ordered list of bounds-checked
//! instructions. It is what the orchestrator validates against a hardware
//! target, what the local simulator executes and what the renderer draws.
//!
//! # Example: Building a Bell State
//!
//! ```rust
//! use qhub_ir::{Circuit, ClbitId, QubitId};
//!
//! let mut circuit = Circuit::with_size("bell_state", 2, 2);
//! circuit.h(QubitId(0)).unwrap();
//! circuit.cx(QubitId(0), QubitId(1)).unwrap();
//! circuit.measure(QubitId(0), ClbitId(0)).unwrap();
//! circuit.measure(QubitId(1), ClbitId(1)).unwrap();
//!
//! assert_eq!(circuit.num_qubits(), 2);
//! assert!(circuit.has_measurements());
//! ```

pub mod circuit;
pub mod error;
pub mod gate;
pub mod instruction;
pub mod predefined;
pub mod qubit;

pub use circuit::Circuit;
pub use error::{IrError, IrResult};
pub use gate::StandardGate;
pub use instruction::{Instruction, InstructionKind};
pub use predefined::{PREDEFINED_CIRCUITS, predefined};
pub use qubit::{ClbitId, QubitId};
