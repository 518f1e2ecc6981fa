//! Scaling Policy Port
//!
//! The dispatcher hands the policy a load snapshot on every request in
//! auto mode; the policy answers with a new target or leaves the current
//! one alone. The pool treats target changes as authoritative.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the cluster target is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    /// Target is set only by operator command.
    Manual,
    /// A scaling policy adjusts the target on every dispatch.
    Auto,
}

impl ScalingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            _ => Err(format!(
                "unknown scaling mode: '{s}'. Valid options: manual, auto"
            )),
        }
    }
}

/// Dispatch-time view of cluster load.
#[derive(Debug, Clone, Copy)]
pub struct LoadSnapshot {
    /// Dispatches currently in flight across the whole fleet.
    pub tasks_in_flight: u32,
    /// Workers in Starting or Running.
    pub active_workers: usize,
    /// Current cluster target.
    pub target: usize,
    /// Upper bound on the fleet size.
    pub worker_cap: usize,
}

/// Scaling policy port trait.
pub trait ScalingPolicy: Send + Sync + fmt::Debug {
    /// Plan a new target for the observed load; `None` keeps the current
    /// target.
    fn plan(&self, snapshot: &LoadSnapshot) -> Option<usize>;
}
