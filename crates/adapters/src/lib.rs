//! Adapters - Infrastructure Implementations
//!
//! This crate contains the implementations of the ports defined in
//! nimbus-ports: the cloud platform adapters and configuration loading.

pub mod config;
pub mod provider_factory;
pub mod providers;

pub use crate::config::{AppConfig, ConfigError};
pub use crate::provider_factory::build_platform;
pub use crate::providers::{AzurePlatform, DigitalOceanPlatform, GcpPlatform, MockPlatform};

// Re-export types from nimbus-ports
pub use nimbus_ports::{CloudPlatform, PlatformKind, ProvisionError};
