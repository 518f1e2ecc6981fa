//! Azure Platform Adapter
//!
//! Provisions virtual machines through the `az` CLI.

use async_trait::async_trait;
use nimbus_core::Worker;
use nimbus_ports::{CloudPlatform, PlatformKind, ProvisionError};
use tracing::info;

use crate::config::AzureConfig;
use crate::providers::{bootstrap_runtime, instance_name, parse_ip, release_instance, run_cli};

/// Azure worker platform
#[derive(Debug, Clone)]
pub struct AzurePlatform {
    config: AzureConfig,
}

impl AzurePlatform {
    pub fn new(config: AzureConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CloudPlatform for AzurePlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Azure
    }

    async fn create_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        let name = instance_name(worker.id());

        let stdout = run_cli(
            "az",
            &[
                "vm",
                "create",
                "--resource-group",
                &self.config.resource_group,
                "--name",
                &name,
                "--image",
                &self.config.image,
                "--size",
                &self.config.vm_size,
                "--query",
                "privateIpAddress",
                "--output",
                "tsv",
            ],
        )
        .await?;

        let ip = parse_ip(&stdout)?;
        worker
            .assign_ip(ip)
            .map_err(|e| ProvisionError::Platform(e.to_string()))?;

        info!(worker_id = %worker.id(), %ip, instance = %name, "azure vm created");
        bootstrap_runtime(ip, &self.config.runtime_command).await
    }

    async fn delete_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        let name = instance_name(worker.id());
        release_instance(
            "az",
            &[
                "vm",
                "delete",
                "--resource-group",
                &self.config.resource_group,
                "--name",
                &name,
                "--yes",
            ],
        )
        .await?;

        info!(worker_id = %worker.id(), instance = %name, "azure vm deleted");
        Ok(())
    }
}
