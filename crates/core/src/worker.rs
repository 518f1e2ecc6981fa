//! Worker Domain Entity
//!
//! A `Worker` is one remote VM running a lambda execution sandbox. The
//! pool owns every record; the dispatcher holds transient `Arc` references
//! while a request is in flight.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Worker identifier, unique and monotonic within a controller lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Mint the id for the given pool sequence number.
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("worker-{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states of a worker.
///
/// The pool keeps one map per state; a worker's state is which map holds
/// it, so state exclusivity is structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Running,
    Cleaning,
    Destroying,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Cleaning => "cleaning",
            Self::Destroying => "destroying",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-worker record shared between the pool and in-flight dispatches.
///
/// The address is written exactly once by the platform adapter when
/// provisioning completes; the task counter is the only cross-boundary
/// mutable datum and uses atomics.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    ip: OnceLock<IpAddr>,
    num_task: AtomicU32,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            ip: OnceLock::new(),
            num_task: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Address assigned by the platform adapter, if provisioned.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip.get().copied()
    }

    /// Record the instance address. Fails if one was already assigned.
    pub fn assign_ip(&self, ip: IpAddr) -> Result<(), DomainError> {
        self.ip
            .set(ip)
            .map_err(|_| DomainError::AddressAssigned(self.id.clone()))
    }

    /// Dispatches currently in flight through this worker.
    pub fn num_task(&self) -> u32 {
        self.num_task.load(Ordering::SeqCst)
    }

    pub fn task_started(&self) -> u32 {
        self.num_task.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn task_finished(&self) -> u32 {
        self.num_task.fetch_sub(1, Ordering::SeqCst) - 1
    }
}
