//! Configuration loading

mod app_config;

pub use app_config::{
    AppConfig, AzureConfig, ConfigError, DigitalOceanConfig, GcpConfig, LogConfig, ServerConfig,
    ThresholdConfig,
};
