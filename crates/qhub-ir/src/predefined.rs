//! Named library circuits offered to users as starting points.

use std::f64::consts::PI;

use crate::circuit::Circuit;
use crate::error::{IrError, IrResult};
use crate::qubit::{ClbitId, QubitId};

/// Names accepted by [`predefined`], in display order.
pub const PREDEFINED_CIRCUITS: &[&str] = &[
    "bell_state",
    "phase_circuit",
    "quantum_teleportation",
    "shor_factor_15",
    "grover_2qubit",
    "deutsch_jozsa",
    "quantum_fourier_transform",
    "quantum_phase_estimation",
];

const HALF_PI: f64 = 1.5708;

/// Build a library circuit by name.
pub fn predefined(name: &str) -> IrResult<Circuit> {
    match name {
        "bell_state" => bell_state(),
        "phase_circuit" => phase_circuit(),
        "quantum_teleportation" => teleportation(),
        "shor_factor_15" => shor_factor_15(),
        "grover_2qubit" => grover_2qubit(),
        "deutsch_jozsa" => deutsch_jozsa(),
        "quantum_fourier_transform" => qft3(),
        "quantum_phase_estimation" => phase_estimation(),
        other => Err(IrError::UnknownCircuit(other.to_string())),
    }
}

fn q(i: u32) -> QubitId {
    QubitId(i)
}

fn c(i: u32) -> ClbitId {
    ClbitId(i)
}

fn bell_state() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("bell_state", 2, 2);
    circuit.h(q(0))?.cx(q(0), q(1))?;
    circuit.measure(q(0), c(0))?.measure(q(1), c(1))?;
    Ok(circuit)
}

// No classical register: only usable in estimator mode.
fn phase_circuit() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("phase_circuit", 2, 0);
    circuit.cp(HALF_PI, q(0), q(1))?;
    Ok(circuit)
}

fn teleportation() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("quantum_teleportation", 3, 2);
    circuit.h(q(1))?.cx(q(1), q(2))?;
    circuit.h(q(0))?;
    circuit.cx(q(0), q(1))?.h(q(0))?;
    circuit.measure(q(0), c(0))?.measure(q(1), c(1))?;
    // Deferred corrections in place of classically controlled gates.
    circuit.cx(q(1), q(2))?.cz(q(0), q(2))?;
    Ok(circuit)
}

fn shor_factor_15() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("shor_factor_15", 9, 4);
    for i in 0..4 {
        circuit.h(q(i))?;
    }
    // Modular exponentiation, one control per counting qubit.
    for (ctrl, a, b, phase_target) in [(0, 4, 5, 6), (1, 5, 6, 7), (2, 6, 7, 4), (3, 7, 4, 5)] {
        circuit.cx(q(ctrl), q(a))?;
        circuit.cx(q(ctrl), q(b))?;
        circuit.cp(HALF_PI, q(ctrl), q(phase_target))?;
    }
    // Inverse QFT on the counting register.
    circuit.h(q(3))?;
    circuit.cp(-PI / 2.0, q(2), q(3))?.h(q(2))?;
    circuit.cp(-PI / 4.0, q(1), q(3))?;
    circuit.cp(-PI / 2.0, q(1), q(2))?.h(q(1))?;
    circuit.cp(-PI / 8.0, q(0), q(3))?;
    circuit.cp(-PI / 4.0, q(0), q(2))?;
    circuit.cp(-PI / 2.0, q(0), q(1))?.h(q(0))?;
    circuit.swap(q(0), q(3))?.swap(q(1), q(2))?;
    for i in 0..4 {
        circuit.measure(q(i), c(i))?;
    }
    Ok(circuit)
}

fn grover_2qubit() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("grover_2qubit", 2, 2);
    circuit.h(q(0))?.h(q(1))?;
    circuit.x(q(0))?.x(q(1))?;
    circuit.h(q(1))?.cx(q(0), q(1))?.h(q(1))?;
    circuit.x(q(0))?.x(q(1))?;
    circuit.h(q(0))?.h(q(1))?;
    circuit.measure(q(0), c(0))?.measure(q(1), c(1))?;
    Ok(circuit)
}

fn deutsch_jozsa() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("deutsch_jozsa", 3, 2);
    circuit.h(q(0))?.h(q(1))?;
    circuit.x(q(2))?.h(q(2))?;
    circuit.cx(q(0), q(2))?.cx(q(1), q(2))?;
    circuit.h(q(0))?.h(q(1))?;
    circuit.measure(q(0), c(0))?.measure(q(1), c(1))?;
    Ok(circuit)
}

fn qft3() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("quantum_fourier_transform", 3, 3);
    circuit.h(q(0))?;
    circuit.cp(PI / 2.0, q(1), q(0))?.h(q(1))?;
    circuit.cp(PI / 4.0, q(2), q(0))?;
    circuit.cp(PI / 2.0, q(2), q(1))?.h(q(2))?;
    circuit.measure_all()?;
    Ok(circuit)
}

fn phase_estimation() -> IrResult<Circuit> {
    let mut circuit = Circuit::with_size("quantum_phase_estimation", 3, 2);
    circuit.h(q(0))?.h(q(1))?.x(q(2))?;
    circuit.cp(1.57, q(0), q(2))?;
    circuit.cp(3.14, q(1), q(2))?;
    circuit.h(q(0))?.h(q(1))?;
    circuit.measure(q(0), c(0))?.measure(q(1), c(1))?;
    Ok(circuit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_builds() {
        for name in PREDEFINED_CIRCUITS {
            let circuit = predefined(name).unwrap();
            assert_eq!(circuit.name(), *name);
            assert!(circuit.num_ops() > 0);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            predefined("nope"),
            Err(IrError::UnknownCircuit(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_phase_circuit_has_no_measurement() {
        let circuit = predefined("phase_circuit").unwrap();
        assert!(!circuit.has_measurements());
        assert_eq!(circuit.active_qubits().len(), 2);
    }

    #[test]
    fn test_shor_shape() {
        let circuit = predefined("shor_factor_15").unwrap();
        assert_eq!(circuit.num_qubits(), 9);
        assert_eq!(circuit.num_clbits(), 4);
    }
}
