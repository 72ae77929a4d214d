//! Compute targets exposed by a remote service.

use serde::{Deserialize, Serialize};

/// A device (or simulator) jobs can be dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Service-wide identifier, e.g. `ibm_brisbane`.
    pub id: String,
    /// Number of physical qubits.
    pub num_qubits: u32,
    /// Whether the target currently accepts jobs.
    pub operational: bool,
    /// Jobs waiting ahead of a new submission.
    pub pending_jobs: u32,
}

impl Target {
    /// Create an operational target with an empty queue.
    pub fn new(id: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            id: id.into(),
            num_qubits,
            operational: true,
            pending_jobs: 0,
        }
    }

    /// Set the queue depth.
    pub fn with_pending_jobs(mut self, pending_jobs: u32) -> Self {
        self.pending_jobs = pending_jobs;
        self
    }

    /// Mark the target as offline.
    pub fn offline(mut self) -> Self {
        self.operational = false;
        self
    }

    /// Human-readable label used when offering the target to a user.
    pub fn label(&self) -> String {
        format!(
            "{} ({} qubits, {} pending jobs)",
            self.id, self.num_qubits, self.pending_jobs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        let t = Target::new("ibm_kyiv", 127).with_pending_jobs(4);
        assert_eq!(t.label(), "ibm_kyiv (127 qubits, 4 pending jobs)");
        assert!(t.operational);
        assert!(!t.offline().operational);
    }
}
