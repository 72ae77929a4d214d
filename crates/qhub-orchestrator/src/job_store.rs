//! Sharded, thread-safe job store.
//!
//! The single source of truth for job status queries. Every operation takes
//! one shard lock for one critical section, so a read never observes a
//! partially applied update and two writers to the same job serialize.

use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};

use rustc_hash::{FxHashMap, FxHasher};

use crate::job::{Artifacts, JobRecord};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Outcome of [`JobStore::update_if_not_terminal`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The update was stored; carries the new record.
    Applied(JobRecord),
    /// The stored record is terminal and was left alone; carries it.
    Terminal(JobRecord),
    /// The update would move the state backwards; carries the stored record.
    Regressed(JobRecord),
    /// No record with this id.
    Missing,
}

impl UpdateOutcome {
    /// The record now in the store, if any.
    pub fn into_record(self) -> Option<JobRecord> {
        match self {
            UpdateOutcome::Applied(r) | UpdateOutcome::Terminal(r) | UpdateOutcome::Regressed(r) => {
                Some(r)
            }
            UpdateOutcome::Missing => None,
        }
    }
}

/// Job id → record map split into independently locked shards.
pub struct JobStore {
    shards: Box<[RwLock<FxHashMap<String, JobRecord>>]>,
}

impl JobStore {
    /// Create a store with [`DEFAULT_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a store with `shards` shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| RwLock::new(FxHashMap::default()))
                .collect(),
        }
    }

    fn shard(&self, job_id: &str) -> &RwLock<FxHashMap<String, JobRecord>> {
        let mut hasher = FxHasher::default();
        job_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Insert `record` unless its id is already present. Returns whether it
    /// was inserted.
    pub fn insert_if_absent(&self, record: JobRecord) -> bool {
        let mut shard = self
            .shard(record.job_id.as_str())
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if shard.contains_key(record.job_id.as_str()) {
            return false;
        }
        shard.insert(record.job_id.0.clone(), record);
        true
    }

    /// Apply `update` to a copy of the stored record and store the copy,
    /// unless the stored record is terminal or the copy's state ranks below
    /// the stored one. The job id cannot be changed by `update`.
    pub fn update_if_not_terminal<F>(&self, job_id: &str, update: F) -> UpdateOutcome
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut shard = self
            .shard(job_id)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = shard.get_mut(job_id) else {
            return UpdateOutcome::Missing;
        };
        if current.is_terminal() {
            return UpdateOutcome::Terminal(current.clone());
        }

        let mut next = current.clone();
        update(&mut next);
        next.job_id.clone_from(&current.job_id);
        if next.status.rank() < current.status.rank() {
            return UpdateOutcome::Regressed(current.clone());
        }
        *current = next;
        UpdateOutcome::Applied(current.clone())
    }

    /// Fill missing artifact keys, terminal records included. Existing keys
    /// are never replaced.
    pub fn backfill_artifacts(&self, job_id: &str, artifacts: &Artifacts) -> Option<JobRecord> {
        let mut shard = self
            .shard(job_id)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let record = shard.get_mut(job_id)?;
        record.artifacts.fill_from(artifacts);
        Some(record.clone())
    }

    /// Snapshot of a record.
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.shard(job_id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record, ordered by job id.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .shards
            .iter()
            .flat_map(|s| {
                s.read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        records.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        records
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
