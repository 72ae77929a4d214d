//! Remote job identifiers and lifecycle states.
//!
//! ```text
//!   submit() ──→ Queued ──→ Running ──→ Done
//!                  │           │
//!                  └───────────┴──→ Cancelled | Error(reason)
//! ```

use serde::{Deserialize, Serialize};

/// Identifier issued by the remote service on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteJobId(pub String);

impl RemoteJobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RemoteJobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteJobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteJobStatus {
    /// Waiting in the target's queue.
    Queued,
    /// Executing on the target.
    Running,
    /// Finished; a result can be fetched.
    Done,
    /// Cancelled by the service or an operator.
    Cancelled,
    /// Failed on the service side.
    Error(String),
}

impl RemoteJobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteJobStatus::Done | RemoteJobStatus::Cancelled | RemoteJobStatus::Error(_)
        )
    }
}

impl std::fmt::Display for RemoteJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteJobStatus::Queued => write!(f, "QUEUED"),
            RemoteJobStatus::Running => write!(f, "RUNNING"),
            RemoteJobStatus::Done => write!(f, "DONE"),
            RemoteJobStatus::Cancelled => write!(f, "CANCELLED"),
            RemoteJobStatus::Error(msg) => write!(f, "ERROR ({msg})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!RemoteJobStatus::Queued.is_terminal());
        assert!(!RemoteJobStatus::Running.is_terminal());
        assert!(RemoteJobStatus::Done.is_terminal());
        assert!(RemoteJobStatus::Cancelled.is_terminal());
        assert!(RemoteJobStatus::Error("boom".into()).is_terminal());
    }

    #[test]
    fn test_job_id_display() {
        let id = RemoteJobId::from("job-123");
        assert_eq!(id.to_string(), "job-123");
        assert_eq!(id.as_str(), "job-123");
    }
}
