//! Cloud Platform Port
//!
//! This module defines the port (trait) for the cloud platforms that
//! provision and release worker instances. It is the only seam through
//! which the controller performs cloud I/O.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use nimbus_core::{Worker, WorkerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported platform backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Gcp,
    Azure,
    #[serde(rename = "do")]
    DigitalOcean,
    Mock,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::DigitalOcean => "do",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcp" => Ok(Self::Gcp),
            "azure" => Ok(Self::Azure),
            "do" | "digitalocean" => Ok(Self::DigitalOcean),
            "mock" => Ok(Self::Mock),
            _ => Err(format!(
                "unknown platform: '{s}'. Valid options: gcp, azure, do, mock"
            )),
        }
    }
}

/// Platform error
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("platform command failed: {0}")]
    Command(String),

    #[error("worker runtime bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("instance address missing or invalid: {0}")]
    Address(String),

    #[error("platform error: {0}")]
    Platform(String),
}

/// Platform port trait.
///
/// `create_instance` and `delete_instance` may take many seconds and must
/// be safe to run concurrently for distinct workers. `delete_instance` is
/// idempotent and retried internally by the adapter.
#[async_trait]
pub trait CloudPlatform: Send + Sync + fmt::Debug {
    fn kind(&self) -> PlatformKind;

    /// Allocate the worker record for the next pool sequence number.
    /// Must not perform any network I/O.
    fn new_worker(&self, seq: u64) -> Arc<Worker> {
        Arc::new(Worker::new(WorkerId::from_seq(seq)))
    }

    /// Provision the remote instance, boot the lambda runtime on it, and
    /// assign the worker address. Returns only once the worker is
    /// dispatchable.
    async fn create_instance(&self, worker: &Worker) -> Result<(), ProvisionError>;

    /// Release the remote instance.
    async fn delete_instance(&self, worker: &Worker) -> Result<(), ProvisionError>;
}
