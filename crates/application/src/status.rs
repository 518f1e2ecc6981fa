//! Read-only cluster and task snapshots

use std::collections::BTreeMap;

use nimbus_core::WorkerId;
use serde::{Deserialize, Serialize};

/// Per-state worker counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub starting: usize,
    pub running: usize,
    pub cleaning: usize,
    pub destroying: usize,
}

impl ClusterStatus {
    /// Workers counted toward the target.
    pub fn active(&self) -> usize {
        self.starting + self.running
    }

    pub fn total(&self) -> usize {
        self.starting + self.running + self.cleaning + self.destroying
    }
}

/// Per-worker task loads and the fleet-wide totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Dispatches in flight across the whole fleet.
    pub total_tasks: u32,
    /// Mean Running-worker load over the active worker count.
    pub task_per_worker: u32,
    /// In-flight count per worker, across all four states.
    pub workers: BTreeMap<WorkerId, u32>,
}

/// Debug view: target plus every worker id by state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub target: usize,
    pub starting: Vec<WorkerId>,
    pub running: Vec<WorkerId>,
    pub cleaning: Vec<WorkerId>,
    pub destroying: Vec<WorkerId>,
}

impl PoolSnapshot {
    /// All ids across the four states.
    pub fn all_ids(&self) -> impl Iterator<Item = &WorkerId> {
        self.starting
            .iter()
            .chain(&self.running)
            .chain(&self.cleaning)
            .chain(&self.destroying)
    }

    pub fn total(&self) -> usize {
        self.starting.len() + self.running.len() + self.cleaning.len() + self.destroying.len()
    }
}
