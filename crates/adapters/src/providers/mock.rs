//! Mock Platform Adapter
//!
//! Fabricates worker instances without any cloud I/O. Used by the test
//! suites and for local development. It honors the same contract as the
//! real adapters: `create_instance` assigns the address before returning
//! and is safe to run concurrently for distinct workers.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::Worker;
use nimbus_ports::{CloudPlatform, PlatformKind, ProvisionError};
use tracing::debug;

/// In-memory worker platform
#[derive(Debug, Default)]
pub struct MockPlatform {
    create_delay: Duration,
    fail_creates: AtomicBool,
    next_host: AtomicU64,
    created: AtomicU64,
    deleted: AtomicU64,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate provisioning latency.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Make every subsequent `create_instance` call fail.
    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    /// Successful `create_instance` calls so far.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// `delete_instance` calls so far.
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::SeqCst)
    }

    fn fabricate_ip(&self) -> IpAddr {
        let host = self.next_host.fetch_add(1, Ordering::SeqCst) + 1;
        IpAddr::V4(Ipv4Addr::new(10, 0, (host >> 8) as u8, (host & 0xff) as u8))
    }
}

#[async_trait]
impl CloudPlatform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Mock
    }

    async fn create_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(ProvisionError::Platform(
                "mock provisioning failure".to_string(),
            ));
        }

        let ip = self.fabricate_ip();
        worker
            .assign_ip(ip)
            .map_err(|e| ProvisionError::Platform(e.to_string()))?;
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(worker_id = %worker.id(), %ip, "mock instance created");
        Ok(())
    }

    async fn delete_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        debug!(worker_id = %worker.id(), "mock instance deleted");
        Ok(())
    }
}
