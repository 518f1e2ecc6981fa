//! GCP Platform Adapter
//!
//! Provisions Compute Engine instances through the `gcloud` CLI.

use async_trait::async_trait;
use nimbus_core::Worker;
use nimbus_ports::{CloudPlatform, PlatformKind, ProvisionError};
use tracing::info;

use crate::config::GcpConfig;
use crate::providers::{bootstrap_runtime, instance_name, parse_ip, release_instance, run_cli};

/// GCP worker platform
#[derive(Debug, Clone)]
pub struct GcpPlatform {
    config: GcpConfig,
}

impl GcpPlatform {
    pub fn new(config: GcpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CloudPlatform for GcpPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Gcp
    }

    async fn create_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        let name = instance_name(worker.id());

        let stdout = run_cli(
            "gcloud",
            &[
                "compute",
                "instances",
                "create",
                &name,
                "--project",
                &self.config.project,
                "--zone",
                &self.config.zone,
                "--machine-type",
                &self.config.machine_type,
                "--image-family",
                &self.config.image_family,
                "--format",
                "get(networkInterfaces[0].networkIP)",
            ],
        )
        .await?;

        let ip = parse_ip(&stdout)?;
        worker
            .assign_ip(ip)
            .map_err(|e| ProvisionError::Platform(e.to_string()))?;

        info!(worker_id = %worker.id(), %ip, instance = %name, "gcp instance created");
        bootstrap_runtime(ip, &self.config.runtime_command).await
    }

    async fn delete_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        let name = instance_name(worker.id());
        release_instance(
            "gcloud",
            &[
                "compute",
                "instances",
                "delete",
                &name,
                "--project",
                &self.config.project,
                "--zone",
                &self.config.zone,
                "--quiet",
            ],
        )
        .await?;

        info!(worker_id = %worker.id(), instance = %name, "gcp instance deleted");
        Ok(())
    }
}
