//! DigitalOcean Platform Adapter
//!
//! Provisions droplets through the `doctl` CLI.

use async_trait::async_trait;
use nimbus_core::Worker;
use nimbus_ports::{CloudPlatform, PlatformKind, ProvisionError};
use tracing::info;

use crate::config::DigitalOceanConfig;
use crate::providers::{bootstrap_runtime, instance_name, parse_ip, release_instance, run_cli};

/// DigitalOcean worker platform
#[derive(Debug, Clone)]
pub struct DigitalOceanPlatform {
    config: DigitalOceanConfig,
}

impl DigitalOceanPlatform {
    pub fn new(config: DigitalOceanConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CloudPlatform for DigitalOceanPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::DigitalOcean
    }

    async fn create_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        let name = instance_name(worker.id());

        let stdout = run_cli(
            "doctl",
            &[
                "compute",
                "droplet",
                "create",
                &name,
                "--region",
                &self.config.region,
                "--size",
                &self.config.size,
                "--image",
                &self.config.image,
                "--wait",
                "--format",
                "PublicIPv4",
                "--no-header",
            ],
        )
        .await?;

        let ip = parse_ip(&stdout)?;
        worker
            .assign_ip(ip)
            .map_err(|e| ProvisionError::Platform(e.to_string()))?;

        info!(worker_id = %worker.id(), %ip, droplet = %name, "droplet created");
        bootstrap_runtime(ip, &self.config.runtime_command).await
    }

    async fn delete_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        let name = instance_name(worker.id());
        release_instance(
            "doctl",
            &["compute", "droplet", "delete", &name, "--force"],
        )
        .await?;

        info!(worker_id = %worker.id(), droplet = %name, "droplet deleted");
        Ok(())
    }
}
