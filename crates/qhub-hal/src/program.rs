//! Program requests and payloads exchanged with the remote service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::counts::Counts;
use crate::error::HalError;

/// Dynamical decoupling pulse sequence inserted into idle windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DdSequence {
    /// X-X.
    XX,
    /// X+ X-.
    XpXm,
    /// X-Y-X-Y.
    #[default]
    XY4,
}

impl fmt::Display for DdSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DdSequence::XX => "XX",
            DdSequence::XpXm => "XpXm",
            DdSequence::XY4 => "XY4",
        })
    }
}

impl FromStr for DdSequence {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XX" => Ok(DdSequence::XX),
            "XPXM" => Ok(DdSequence::XpXm),
            "XY4" => Ok(DdSequence::XY4),
            _ => Err(HalError::Unsupported(format!("DD sequence '{s}'"))),
        }
    }
}

/// Options for a sampling program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerOptions {
    /// Sequence to pad idle qubits with, if any.
    pub dynamical_decoupling: Option<DdSequence>,
}

/// Options for an expectation-value program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatorOptions {
    /// Error-mitigation effort requested from the service.
    pub resilience_level: u8,
}

/// One weighted Pauli string.
///
/// The label is written most significant qubit first, so the rightmost
/// character acts on qubit 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauliTerm {
    /// Pauli label over `I`, `X`, `Y`, `Z`.
    pub label: String,
    /// Real coefficient.
    pub coefficient: f64,
}

impl PauliTerm {
    /// `Z` on each listed qubit and `I` elsewhere, over `num_qubits` qubits.
    pub fn z_on(qubits: &[u32], num_qubits: u32, coefficient: f64) -> Self {
        let label = (0..num_qubits)
            .rev()
            .map(|i| if qubits.contains(&i) { 'Z' } else { 'I' })
            .collect();
        Self { label, coefficient }
    }

    /// Qubits the term acts on non-trivially.
    pub fn support(&self) -> Vec<u32> {
        let n = self.label.len() as u32;
        self.label
            .chars()
            .enumerate()
            .filter(|(_, c)| *c != 'I')
            .map(|(i, _)| n - 1 - i as u32)
            .collect()
    }
}

/// A Hermitian observable as a sum of Pauli terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    /// Terms of the sum.
    pub terms: Vec<PauliTerm>,
}

impl Observable {
    /// Build from terms.
    pub fn new(terms: Vec<PauliTerm>) -> Self {
        Self { terms }
    }
}

/// What the service should compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgramRequest {
    /// Sample measurement outcomes.
    Sampler {
        /// Sampler options.
        options: SamplerOptions,
    },
    /// Estimate the expectation value of an observable.
    Estimator {
        /// The observable.
        observable: Observable,
        /// Estimator options.
        options: EstimatorOptions,
    },
}

/// Raw result returned by the service for a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgramPayload {
    /// Measurement histogram from a sampling program.
    Counts(Counts),
    /// Scalar from an expectation-value program.
    Expectation(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_on_label_order() {
        let term = PauliTerm::z_on(&[0, 2], 4, 1.0);
        assert_eq!(term.label, "IZIZ");
        assert_eq!(term.support(), vec![2, 0]);
    }

    #[test]
    fn test_dd_sequence_parse() {
        assert_eq!("xy4".parse::<DdSequence>().unwrap(), DdSequence::XY4);
        assert_eq!("XpXm".parse::<DdSequence>().unwrap(), DdSequence::XpXm);
        assert!("CPMG".parse::<DdSequence>().is_err());
        assert_eq!(DdSequence::default().to_string(), "XY4");
    }
}
