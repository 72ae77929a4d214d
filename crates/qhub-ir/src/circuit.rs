//! High-level circuit builder API.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::gate::StandardGate;
use crate::instruction::{Instruction, InstructionKind};
use crate::qubit::{ClbitId, QubitId};

/// A quantum circuit.
///
/// Instructions are kept in program order. Every operand is bounds-checked
/// when the instruction is appended, so a constructed circuit only ever
/// refers to qubits and classical bits it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    name: String,
    num_qubits: u32,
    num_clbits: u32,
    instructions: Vec<Instruction>,
}

impl Circuit {
    /// Create a new empty circuit with no qubits.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_size(name, 0, 0)
    }

    /// Create a circuit with a given number of qubits and classical bits.
    pub fn with_size(name: impl Into<String>, num_qubits: u32, num_clbits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            num_clbits,
            instructions: vec![],
        }
    }

    /// Decode a circuit from its JSON form, re-validating every instruction.
    pub fn from_json(json: &str) -> IrResult<Self> {
        let raw: Circuit = serde_json::from_str(json)?;
        let mut circuit = Circuit::with_size(raw.name, raw.num_qubits, raw.num_clbits);
        for inst in raw.instructions {
            circuit.apply(inst)?;
        }
        Ok(circuit)
    }

    /// Append an instruction after validating its operands.
    pub fn apply(&mut self, inst: Instruction) -> IrResult<&mut Self> {
        self.validate(&inst)?;
        self.instructions.push(inst);
        Ok(self)
    }

    fn validate(&self, inst: &Instruction) -> IrResult<()> {
        let gate_name = || Some(inst.name().to_string());
        if let InstructionKind::Gate(gate) = &inst.kind {
            let got = inst.qubits.len() as u32;
            if got != gate.num_qubits() {
                return Err(IrError::QubitCountMismatch {
                    gate_name: gate.name().to_string(),
                    expected: gate.num_qubits(),
                    got,
                });
            }
        }
        if inst.is_measure() && inst.qubits.len() != inst.clbits.len() {
            return Err(IrError::MeasureArity {
                qubits: inst.qubits.len(),
                clbits: inst.clbits.len(),
            });
        }
        let mut seen = FxHashSet::default();
        for &qubit in &inst.qubits {
            if qubit.0 >= self.num_qubits {
                return Err(IrError::QubitNotFound {
                    qubit,
                    gate_name: gate_name(),
                });
            }
            if !seen.insert(qubit) {
                return Err(IrError::DuplicateQubit {
                    qubit,
                    gate_name: gate_name(),
                });
            }
        }
        for &clbit in &inst.clbits {
            if clbit.0 >= self.num_clbits {
                return Err(IrError::ClbitNotFound {
                    clbit,
                    gate_name: gate_name(),
                });
            }
        }
        Ok(())
    }

    fn gate1(&mut self, gate: StandardGate, qubit: QubitId) -> IrResult<&mut Self> {
        self.apply(Instruction::gate(gate, [qubit]))
    }

    fn gate2(&mut self, gate: StandardGate, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.apply(Instruction::gate(gate, [q1, q2]))
    }

    // =========================================================================
    // Single-qubit gates
    // =========================================================================

    /// Apply Hadamard gate.
    pub fn h(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::H, qubit)
    }

    /// Apply Pauli-X gate.
    pub fn x(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::X, qubit)
    }

    /// Apply Pauli-Y gate.
    pub fn y(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Y, qubit)
    }

    /// Apply Pauli-Z gate.
    pub fn z(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Z, qubit)
    }

    /// Apply S gate.
    pub fn s(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::S, qubit)
    }

    /// Apply S-dagger gate.
    pub fn sdg(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Sdg, qubit)
    }

    /// Apply T gate.
    pub fn t(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::T, qubit)
    }

    /// Apply T-dagger gate.
    pub fn tdg(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Tdg, qubit)
    }

    /// Apply sqrt(X) gate.
    pub fn sx(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::SX, qubit)
    }

    /// Apply RX rotation.
    pub fn rx(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Rx(theta), qubit)
    }

    /// Apply RY rotation.
    pub fn ry(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Ry(theta), qubit)
    }

    /// Apply RZ rotation.
    pub fn rz(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::Rz(theta), qubit)
    }

    /// Apply phase gate.
    pub fn p(&mut self, theta: f64, qubit: QubitId) -> IrResult<&mut Self> {
        self.gate1(StandardGate::P(theta), qubit)
    }

    // =========================================================================
    // Multi-qubit gates
    // =========================================================================

    /// Apply CNOT gate.
    pub fn cx(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.gate2(StandardGate::CX, control, target)
    }

    /// Apply controlled-Y gate.
    pub fn cy(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.gate2(StandardGate::CY, control, target)
    }

    /// Apply controlled-Z gate.
    pub fn cz(&mut self, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.gate2(StandardGate::CZ, control, target)
    }

    /// Apply controlled phase gate.
    pub fn cp(&mut self, theta: f64, control: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.gate2(StandardGate::CP(theta), control, target)
    }

    /// Apply SWAP gate.
    pub fn swap(&mut self, q1: QubitId, q2: QubitId) -> IrResult<&mut Self> {
        self.gate2(StandardGate::Swap, q1, q2)
    }

    /// Apply Toffoli gate.
    pub fn ccx(&mut self, c1: QubitId, c2: QubitId, target: QubitId) -> IrResult<&mut Self> {
        self.apply(Instruction::gate(StandardGate::CCX, [c1, c2, target]))
    }

    // =========================================================================
    // Non-unitary operations
    // =========================================================================

    /// Measure a qubit into a classical bit.
    pub fn measure(&mut self, qubit: QubitId, clbit: ClbitId) -> IrResult<&mut Self> {
        self.apply(Instruction::measure(qubit, clbit))
    }

    /// Measure every qubit into the classical bit of the same index,
    /// growing the classical register if it is too small.
    pub fn measure_all(&mut self) -> IrResult<&mut Self> {
        if self.num_clbits < self.num_qubits {
            self.num_clbits = self.num_qubits;
        }
        for i in 0..self.num_qubits {
            self.measure(QubitId(i), ClbitId(i))?;
        }
        Ok(self)
    }

    /// Reset a qubit to |0⟩.
    pub fn reset(&mut self, qubit: QubitId) -> IrResult<&mut Self> {
        self.apply(Instruction::reset(qubit))
    }

    /// Add a barrier on the given qubits.
    pub fn barrier(&mut self, qubits: impl IntoIterator<Item = QubitId>) -> IrResult<&mut Self> {
        self.apply(Instruction::barrier(qubits))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Get the number of classical bits.
    pub fn num_clbits(&self) -> u32 {
        self.num_clbits
    }

    /// Instructions in program order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of non-barrier operations.
    pub fn num_ops(&self) -> usize {
        self.instructions.iter().filter(|i| !i.is_barrier()).count()
    }

    /// Whether the circuit measures at least one qubit.
    pub fn has_measurements(&self) -> bool {
        self.instructions.iter().any(Instruction::is_measure)
    }

    /// Qubits touched by at least one non-barrier instruction, in index order.
    pub fn active_qubits(&self) -> Vec<QubitId> {
        let mut used = vec![false; self.num_qubits as usize];
        for inst in self.instructions.iter().filter(|i| i.is_operation()) {
            for q in &inst.qubits {
                used[q.0 as usize] = true;
            }
        }
        used.iter()
            .enumerate()
            .filter(|(_, u)| **u)
            .map(|(i, _)| QubitId(i as u32))
            .collect()
    }

    /// Circuit depth, counting barriers as synchronization points only.
    pub fn depth(&self) -> usize {
        let mut qubit_depth = vec![0usize; self.num_qubits as usize];
        let mut clbit_depth = vec![0usize; self.num_clbits as usize];
        for inst in &self.instructions {
            let start = inst
                .qubits
                .iter()
                .map(|q| qubit_depth[q.0 as usize])
                .chain(inst.clbits.iter().map(|c| clbit_depth[c.0 as usize]))
                .max()
                .unwrap_or(0);
            let level = if inst.is_barrier() { start } else { start + 1 };
            for q in &inst.qubits {
                qubit_depth[q.0 as usize] = level;
            }
            for c in &inst.clbits {
                clbit_depth[c.0 as usize] = level;
            }
        }
        qubit_depth.into_iter().max().unwrap_or(0)
    }

    /// Map logical qubit `i` to physical qubit `layout[i]` on a device with
    /// `num_physical` qubits.
    pub fn remap(&self, layout: &[u32], num_physical: u32) -> IrResult<Circuit> {
        if layout.len() != self.num_qubits as usize {
            return Err(IrError::InvalidLayout(format!(
                "layout has {} entries for {} qubits",
                layout.len(),
                self.num_qubits
            )));
        }
        let mut targets = FxHashSet::default();
        for &p in layout {
            if p >= num_physical {
                return Err(IrError::InvalidLayout(format!(
                    "physical qubit {p} outside device of {num_physical}"
                )));
            }
            if !targets.insert(p) {
                return Err(IrError::InvalidLayout(format!(
                    "physical qubit {p} assigned twice"
                )));
            }
        }

        let mut mapped = Circuit::with_size(self.name.clone(), num_physical, self.num_clbits);
        for inst in &self.instructions {
            mapped.apply(inst.map_qubits(|q| QubitId(layout[q.0 as usize])))?;
        }
        Ok(mapped)
    }

    // =========================================================================
    // Common circuits
    // =========================================================================

    /// Bell state preparation with measurement.
    pub fn bell() -> IrResult<Self> {
        let mut circuit = Circuit::with_size("bell", 2, 2);
        circuit.h(QubitId(0))?.cx(QubitId(0), QubitId(1))?;
        circuit.measure(QubitId(0), ClbitId(0))?;
        circuit.measure(QubitId(1), ClbitId(1))?;
        Ok(circuit)
    }

    /// n-qubit GHZ state with measurement.
    pub fn ghz(n: u32) -> IrResult<Self> {
        let mut circuit = Circuit::with_size(format!("ghz_{n}"), n, n);
        if n == 0 {
            return Ok(circuit);
        }
        circuit.h(QubitId(0))?;
        for i in 1..n {
            circuit.cx(QubitId(0), QubitId(i))?;
        }
        circuit.measure_all()?;
        Ok(circuit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bell_state() {
        let circuit = Circuit::bell().unwrap();
        assert_eq!(circuit.num_qubits(), 2);
        assert_eq!(circuit.num_clbits(), 2);
        assert!(circuit.has_measurements());
        assert_eq!(circuit.depth(), 3);
    }

    #[test]
    fn test_ghz_state() {
        let circuit = Circuit::ghz(5).unwrap();
        assert_eq!(circuit.num_qubits(), 5);
        assert_eq!(circuit.num_ops(), 1 + 4 + 5);
    }

    #[test]
    fn test_out_of_range_qubit() {
        let mut circuit = Circuit::with_size("c", 2, 0);
        let err = circuit.h(QubitId(2)).unwrap_err();
        assert!(matches!(err, IrError::QubitNotFound { .. }));
        assert!(circuit.instructions().is_empty());
    }

    #[test]
    fn test_duplicate_qubit() {
        let mut circuit = Circuit::with_size("c", 2, 0);
        assert!(matches!(
            circuit.cx(QubitId(1), QubitId(1)),
            Err(IrError::DuplicateQubit { .. })
        ));
    }

    #[test]
    fn test_missing_clbit() {
        let mut circuit = Circuit::with_size("c", 1, 0);
        assert!(matches!(
            circuit.measure(QubitId(0), ClbitId(0)),
            Err(IrError::ClbitNotFound { .. })
        ));
    }

    #[test]
    fn test_active_qubits_ignores_barriers() {
        let mut circuit = Circuit::with_size("c", 4, 0);
        circuit.h(QubitId(1)).unwrap();
        circuit.cx(QubitId(1), QubitId(3)).unwrap();
        circuit.barrier([QubitId(0), QubitId(2)]).unwrap();
        assert_eq!(circuit.active_qubits(), vec![QubitId(1), QubitId(3)]);
        assert!(!circuit.has_measurements());
    }

    #[test]
    fn test_measure_all_grows_clbits() {
        let mut circuit = Circuit::with_size("c", 3, 0);
        circuit.measure_all().unwrap();
        assert_eq!(circuit.num_clbits(), 3);
        assert!(circuit.has_measurements());
    }

    #[test]
    fn test_remap() {
        let circuit = Circuit::bell().unwrap();
        let mapped = circuit.remap(&[4, 2], 5).unwrap();
        assert_eq!(mapped.num_qubits(), 5);
        assert_eq!(mapped.active_qubits(), vec![QubitId(2), QubitId(4)]);
        assert_eq!(mapped.instructions()[1].qubits, vec![QubitId(4), QubitId(2)]);
    }

    #[test]
    fn test_remap_rejects_bad_layout() {
        let circuit = Circuit::bell().unwrap();
        assert!(circuit.remap(&[0], 5).is_err());
        assert!(circuit.remap(&[0, 0], 5).is_err());
        assert!(circuit.remap(&[0, 7], 5).is_err());
    }

    #[test]
    fn test_json_round_trip_revalidates() {
        let circuit = Circuit::ghz(3).unwrap();
        let json = serde_json::to_string(&circuit).unwrap();
        assert_eq!(Circuit::from_json(&json).unwrap(), circuit);

        let broken = json.replace("\"num_qubits\":3", "\"num_qubits\":1");
        assert!(Circuit::from_json(&broken).is_err());
    }
}
