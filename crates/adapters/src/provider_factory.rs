//! Platform selection at bootstrap

use std::sync::Arc;

use nimbus_ports::{CloudPlatform, PlatformKind};

use crate::config::AppConfig;
use crate::providers::{AzurePlatform, DigitalOceanPlatform, GcpPlatform, MockPlatform};

/// Build the configured platform adapter. Selection happens once, at pool
/// construction.
pub fn build_platform(config: &AppConfig) -> Arc<dyn CloudPlatform> {
    match config.platform {
        PlatformKind::Gcp => Arc::new(GcpPlatform::new(config.gcp.clone())),
        PlatformKind::Azure => Arc::new(AzurePlatform::new(config.azure.clone())),
        PlatformKind::DigitalOcean => {
            Arc::new(DigitalOceanPlatform::new(config.digitalocean.clone()))
        }
        PlatformKind::Mock => Arc::new(MockPlatform::new()),
    }
}
