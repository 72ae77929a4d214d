//! Local simulator implementation.

use std::time::Instant;
use tracing::{debug, instrument};

use qhub_hal::{Counts, HalError, HalResult, LocalSimulator};
use qhub_ir::Circuit;

use crate::statevector::Statevector;

/// Local statevector simulator.
///
/// Supports circuits up to ~20 qubits (limited by memory). Circuits without
/// any measurement are sampled as if every qubit were measured into the
/// classical bit of the same index.
pub struct StatevectorSimulator {
    max_qubits: u32,
}

impl StatevectorSimulator {
    /// Create a new simulator with default settings.
    pub fn new() -> Self {
        Self { max_qubits: 20 }
    }

    /// Create a simulator with custom max qubits.
    pub fn with_max_qubits(max_qubits: u32) -> Self {
        Self { max_qubits }
    }

    /// Evolve the initial state through every unitary in `circuit`.
    pub fn evolve(&self, circuit: &Circuit) -> HalResult<Statevector> {
        if circuit.num_qubits() > self.max_qubits {
            return Err(HalError::CircuitTooLarge(format!(
                "Circuit has {} qubits but simulator only supports {}",
                circuit.num_qubits(),
                self.max_qubits
            )));
        }
        let mut sv = Statevector::new(circuit.num_qubits() as usize);
        for inst in circuit.instructions() {
            sv.apply(inst)?;
        }
        Ok(sv)
    }
}

impl Default for StatevectorSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Qubit → classical bit routing and the bitstring width for sampling.
fn measurement_map(circuit: &Circuit) -> (Vec<(usize, usize)>, usize) {
    let measured: Vec<(usize, usize)> = circuit
        .instructions()
        .iter()
        .filter(|i| i.is_measure())
        .flat_map(|i| {
            i.qubits
                .iter()
                .zip(&i.clbits)
                .map(|(q, c)| (q.0 as usize, c.0 as usize))
        })
        .collect();
    if measured.is_empty() {
        let n = circuit.num_qubits() as usize;
        ((0..n).map(|q| (q, q)).collect(), n)
    } else {
        (measured, circuit.num_clbits() as usize)
    }
}

impl LocalSimulator for StatevectorSimulator {
    #[instrument(skip(self, circuit), fields(circuit = %circuit.name()))]
    fn run(&self, circuit: &Circuit, shots: u32) -> HalResult<Counts> {
        if shots == 0 {
            return Err(HalError::InvalidShots("shots must be positive".into()));
        }
        let start = Instant::now();
        let sv = self.evolve(circuit)?;
        let (measured, width) = measurement_map(circuit);
        let counts = sv.sample_counts(shots, &measured, width, &mut rand::thread_rng());
        debug!(
            qubits = circuit.num_qubits(),
            shots,
            outcomes = counts.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Simulation completed"
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qhub_ir::QubitId;

    #[test]
    fn test_bell_state() {
        let sim = StatevectorSimulator::new();
        let counts = sim.run(&Circuit::bell().unwrap(), 1000).unwrap();
        assert_eq!(counts.get("00") + counts.get("11"), 1000);
        assert_eq!(counts.get("01") + counts.get("10"), 0);
    }

    #[test]
    fn test_ghz_state() {
        let sim = StatevectorSimulator::new();
        let counts = sim.run(&Circuit::ghz(3).unwrap(), 1000).unwrap();
        assert_eq!(counts.get("000") + counts.get("111"), 1000);
    }

    #[test]
    fn test_unmeasured_circuit_measures_all() {
        let mut circuit = Circuit::with_size("flip", 3, 0);
        circuit.x(QubitId(2)).unwrap();
        let counts = StatevectorSimulator::new().run(&circuit, 20).unwrap();
        assert_eq!(counts.get("100"), 20);
    }

    #[test]
    fn test_partial_measurement_width_follows_clbits() {
        let mut circuit = Circuit::with_size("partial", 3, 1);
        circuit.x(QubitId(1)).unwrap();
        circuit.measure(QubitId(1), qhub_ir::ClbitId(0)).unwrap();
        let counts = StatevectorSimulator::new().run(&circuit, 8).unwrap();
        assert_eq!(counts.get("1"), 8);
    }

    #[test]
    fn test_too_many_qubits() {
        let sim = StatevectorSimulator::with_max_qubits(5);
        let circuit = Circuit::with_size("test", 10, 0);
        assert!(matches!(sim.run(&circuit, 100), Err(HalError::CircuitTooLarge(_))));
    }

    #[test]
    fn test_zero_shots() {
        let sim = StatevectorSimulator::new();
        assert!(matches!(
            sim.run(&Circuit::bell().unwrap(), 0),
            Err(HalError::InvalidShots(_))
        ));
    }
}
