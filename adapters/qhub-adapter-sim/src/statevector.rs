//! Statevector simulation engine.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use qhub_hal::{Counts, HalError, HalResult};
use qhub_ir::{Instruction, InstructionKind, StandardGate};

type Matrix2 = [[Complex64; 2]; 2];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

fn phase_matrix(theta: f64) -> Matrix2 {
    [[ONE, ZERO], [ZERO, Complex64::from_polar(1.0, theta)]]
}

fn gate_matrix(gate: &StandardGate) -> Option<Matrix2> {
    let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
    let m = match *gate {
        StandardGate::X | StandardGate::CX | StandardGate::CCX => [[ZERO, ONE], [ONE, ZERO]],
        StandardGate::Y | StandardGate::CY => [[ZERO, -I], [I, ZERO]],
        StandardGate::Z | StandardGate::CZ => [[ONE, ZERO], [ZERO, -ONE]],
        StandardGate::H => [[h, h], [h, -h]],
        StandardGate::S => phase_matrix(PI / 2.0),
        StandardGate::Sdg => phase_matrix(-PI / 2.0),
        StandardGate::T => phase_matrix(PI / 4.0),
        StandardGate::Tdg => phase_matrix(-PI / 4.0),
        StandardGate::P(theta) | StandardGate::CP(theta) => phase_matrix(theta),
        StandardGate::SX => {
            let a = Complex64::new(0.5, 0.5);
            let b = Complex64::new(0.5, -0.5);
            [[a, b], [b, a]]
        }
        StandardGate::Rx(theta) => {
            let c = Complex64::new((theta / 2.0).cos(), 0.0);
            let s = Complex64::new(0.0, -(theta / 2.0).sin());
            [[c, s], [s, c]]
        }
        StandardGate::Ry(theta) => {
            let c = Complex64::new((theta / 2.0).cos(), 0.0);
            let s = Complex64::new((theta / 2.0).sin(), 0.0);
            [[c, -s], [s, c]]
        }
        StandardGate::Rz(theta) => [
            [Complex64::from_polar(1.0, -theta / 2.0), ZERO],
            [ZERO, Complex64::from_polar(1.0, theta / 2.0)],
        ],
        StandardGate::Swap => return None,
    };
    Some(m)
}

/// A statevector representing a quantum state.
///
/// Basis index bit `k` is the value of qubit `k`.
pub struct Statevector {
    amplitudes: Vec<Complex64>,
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let mut amplitudes = vec![ZERO; 1 << num_qubits];
        amplitudes[0] = ONE;
        Self {
            amplitudes,
            num_qubits,
        }
    }

    /// Apply an instruction. Measurements are deferred to sampling.
    pub fn apply(&mut self, instruction: &Instruction) -> HalResult<()> {
        let qubits: Vec<usize> = instruction.qubits.iter().map(|q| q.0 as usize).collect();
        match &instruction.kind {
            InstructionKind::Gate(StandardGate::Swap) => {
                self.apply_swap(qubits[0], qubits[1]);
            }
            InstructionKind::Gate(gate) => {
                let Some(matrix) = gate_matrix(gate) else {
                    return Err(HalError::Unsupported(gate.name().to_string()));
                };
                // Last operand is the target, any preceding ones are controls.
                let (target, controls) = qubits
                    .split_last()
                    .ok_or_else(|| HalError::InvalidCircuit("gate without operands".into()))?;
                let control_mask = controls.iter().fold(0usize, |m, &c| m | (1 << c));
                self.apply_controlled(control_mask, *target, &matrix);
            }
            InstructionKind::Measure | InstructionKind::Barrier => {}
            InstructionKind::Reset => {
                return Err(HalError::Unsupported(
                    "reset in a deferred-measurement simulation".into(),
                ));
            }
        }
        Ok(())
    }

    /// Apply `matrix` to `target` on the subspace where every control bit is set.
    fn apply_controlled(&mut self, control_mask: usize, target: usize, matrix: &Matrix2) {
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if i & tgt_mask == 0 && i & control_mask == control_mask {
                let j = i | tgt_mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = matrix[0][0] * a + matrix[0][1] * b;
                self.amplitudes[j] = matrix[1][0] * a + matrix[1][1] * b;
            }
        }
    }

    fn apply_swap(&mut self, q1: usize, q2: usize) {
        let mask1 = 1 << q1;
        let mask2 = 1 << q2;
        for i in 0..self.amplitudes.len() {
            if i & mask1 != 0 && i & mask2 == 0 {
                let j = (i & !mask1) | mask2;
                self.amplitudes.swap(i, j);
            }
        }
    }

    /// Born-rule probability of each basis state.
    pub fn probabilities(&self) -> Vec<f64> {
        self.amplitudes.iter().map(Complex64::norm_sqr).collect()
    }

    /// ⟨Z⊗…⊗Z⟩ over the qubits set in `mask`.
    pub fn expectation_z(&self, mask: usize) -> f64 {
        self.amplitudes
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let sign = if (i & mask).count_ones() % 2 == 0 { 1.0 } else { -1.0 };
                sign * a.norm_sqr()
            })
            .sum()
    }

    /// Draw `shots` samples and histogram them.
    ///
    /// `measured[k] = (qubit, clbit)` routes a measured qubit into a classical
    /// bit; the resulting bitstrings are `width` characters wide with
    /// classical bit 0 rightmost.
    pub fn sample_counts<R: Rng>(
        &self,
        shots: u32,
        measured: &[(usize, usize)],
        width: usize,
        rng: &mut R,
    ) -> Counts {
        let mut cumulative = Vec::with_capacity(self.amplitudes.len());
        let mut acc = 0.0;
        for p in self.probabilities() {
            acc += p;
            cumulative.push(acc);
        }

        let mut counts = Counts::new();
        for _ in 0..shots {
            let r: f64 = rng.r#gen::<f64>() * acc;
            let outcome = cumulative
                .partition_point(|&c| c <= r)
                .min(cumulative.len() - 1);
            let mut bits = vec!['0'; width];
            for &(qubit, clbit) in measured {
                if outcome & (1 << qubit) != 0 {
                    bits[width - 1 - clbit] = '1';
                }
            }
            counts.insert(bits.into_iter().collect::<String>(), 1);
        }
        counts
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }
}
