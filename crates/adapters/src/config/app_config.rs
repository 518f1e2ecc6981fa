//! Unified Application Configuration
//!
//! This module provides the controller's configuration structure. It is
//! loaded from a YAML file (`NIMBUS_CONFIG_PATH`), inline YAML
//! (`NIMBUS_CONFIG_YAML`), or environment variables, in that order, and
//! validated before the controller starts.

use std::path::PathBuf;
use std::str::FromStr;

use nimbus_ports::{PlatformKind, ScalingMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read configuration file: {0}")]
    FileRead(#[source] std::io::Error),

    #[error("failed to parse configuration YAML: {0}")]
    ParseYaml(#[source] serde_yaml::Error),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Platform backend that provisions worker instances
    pub platform: PlatformKind,

    /// Target control: operator-driven or policy-driven
    pub scaling: ScalingMode,

    /// Upper bound on the fleet size; also the ready-queue capacity
    pub worker_cap: usize,

    /// Remote worker port invocations are forwarded to
    pub worker_port: u16,

    /// Controller HTTP listener
    pub server: ServerConfig,

    /// Threshold policy watermarks (auto mode)
    pub thresholds: ThresholdConfig,

    /// Append-only event files
    pub logs: LogConfig,

    /// GCP platform settings
    pub gcp: GcpConfig,

    /// Azure platform settings
    pub azure: AzureConfig,

    /// DigitalOcean platform settings
    pub digitalocean: DigitalOceanConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: PlatformKind::Mock,
            scaling: ScalingMode::Manual,
            worker_cap: 20,
            worker_port: 5000,
            server: ServerConfig::default(),
            thresholds: ThresholdConfig::default(),
            logs: LogConfig::default(),
            gcp: GcpConfig::default(),
            azure: AzureConfig::default(),
            digitalocean: DigitalOceanConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and file
    pub fn load() -> Result<Self> {
        let config = match (
            std::env::var("NIMBUS_CONFIG_PATH").ok(),
            std::env::var("NIMBUS_CONFIG_YAML").ok(),
        ) {
            (Some(path), _) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path));
                }
                let content = std::fs::read_to_string(&path).map_err(ConfigError::FileRead)?;
                serde_yaml::from_str(&content).map_err(ConfigError::ParseYaml)?
            }
            (None, Some(yaml)) => serde_yaml::from_str(&yaml).map_err(ConfigError::ParseYaml)?,
            _ => Self::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            platform: parse_env("NIMBUS_PLATFORM", defaults.platform)?,
            scaling: parse_env("NIMBUS_SCALING", defaults.scaling)?,
            worker_cap: parse_env("NIMBUS_WORKER_CAP", defaults.worker_cap)?,
            worker_port: parse_env("NIMBUS_WORKER_PORT", defaults.worker_port)?,
            server: ServerConfig::from_env()?,
            thresholds: ThresholdConfig::from_env()?,
            logs: LogConfig::from_env(),
            gcp: GcpConfig::from_env(),
            azure: AzureConfig::from_env(),
            digitalocean: DigitalOceanConfig::from_env(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_cap == 0 {
            return Err(ConfigError::InvalidValue(
                "worker_cap must be greater than zero".to_string(),
            ));
        }
        if self.worker_port == 0 {
            return Err(ConfigError::InvalidValue(
                "worker_port must be greater than zero".to_string(),
            ));
        }
        self.server.validate()?;
        self.thresholds.validate()?;
        Ok(())
    }
}

/// Controller HTTP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("NIMBUS_HOST").unwrap_or(defaults.host),
            port: parse_env("NIMBUS_PORT", defaults.port)?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "server host must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Threshold scaling watermarks, in tasks per active worker
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub scale_up_ratio: f64,
    pub scale_down_ratio: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            scale_up_ratio: 3.0,
            scale_down_ratio: 1.0,
        }
    }
}

impl ThresholdConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            scale_up_ratio: parse_env("NIMBUS_SCALE_UP_RATIO", defaults.scale_up_ratio)?,
            scale_down_ratio: parse_env("NIMBUS_SCALE_DOWN_RATIO", defaults.scale_down_ratio)?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.scale_down_ratio < 0.0 || self.scale_up_ratio <= self.scale_down_ratio {
            return Err(ConfigError::InvalidValue(
                "scale_up_ratio must be greater than scale_down_ratio".to_string(),
            ));
        }
        Ok(())
    }
}

/// Append-only event file paths
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub cluster_log_path: PathBuf,
    pub task_log_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            cluster_log_path: PathBuf::from("cluster.log"),
            task_log_path: PathBuf::from("tasks.log"),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cluster_log_path: std::env::var("NIMBUS_CLUSTER_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.cluster_log_path),
            task_log_path: std::env::var("NIMBUS_TASK_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.task_log_path),
        }
    }
}

/// GCP platform settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GcpConfig {
    pub project: String,
    pub zone: String,
    pub machine_type: String,
    pub image_family: String,
    /// Command that boots the lambda runtime on a fresh instance
    pub runtime_command: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            zone: "us-central1-a".to_string(),
            machine_type: "e2-medium".to_string(),
            image_family: "nimbus-worker".to_string(),
            runtime_command: default_runtime_command(),
        }
    }
}

impl GcpConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            project: std::env::var("NIMBUS_GCP_PROJECT").unwrap_or(defaults.project),
            zone: std::env::var("NIMBUS_GCP_ZONE").unwrap_or(defaults.zone),
            machine_type: std::env::var("NIMBUS_GCP_MACHINE_TYPE").unwrap_or(defaults.machine_type),
            image_family: std::env::var("NIMBUS_GCP_IMAGE_FAMILY").unwrap_or(defaults.image_family),
            runtime_command: std::env::var("NIMBUS_RUNTIME_COMMAND")
                .unwrap_or(defaults.runtime_command),
        }
    }
}

/// Azure platform settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AzureConfig {
    pub resource_group: String,
    pub image: String,
    pub vm_size: String,
    pub runtime_command: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            resource_group: "nimbus".to_string(),
            image: "Ubuntu2204".to_string(),
            vm_size: "Standard_B2s".to_string(),
            runtime_command: default_runtime_command(),
        }
    }
}

impl AzureConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            resource_group: std::env::var("NIMBUS_AZURE_RESOURCE_GROUP")
                .unwrap_or(defaults.resource_group),
            image: std::env::var("NIMBUS_AZURE_IMAGE").unwrap_or(defaults.image),
            vm_size: std::env::var("NIMBUS_AZURE_VM_SIZE").unwrap_or(defaults.vm_size),
            runtime_command: std::env::var("NIMBUS_RUNTIME_COMMAND")
                .unwrap_or(defaults.runtime_command),
        }
    }
}

/// DigitalOcean platform settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DigitalOceanConfig {
    pub region: String,
    pub size: String,
    pub image: String,
    pub runtime_command: String,
}

impl Default for DigitalOceanConfig {
    fn default() -> Self {
        Self {
            region: "nyc1".to_string(),
            size: "s-2vcpu-4gb".to_string(),
            image: "ubuntu-22-04-x64".to_string(),
            runtime_command: default_runtime_command(),
        }
    }
}

impl DigitalOceanConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            region: std::env::var("NIMBUS_DO_REGION").unwrap_or(defaults.region),
            size: std::env::var("NIMBUS_DO_SIZE").unwrap_or(defaults.size),
            image: std::env::var("NIMBUS_DO_IMAGE").unwrap_or(defaults.image),
            runtime_command: std::env::var("NIMBUS_RUNTIME_COMMAND")
                .unwrap_or(defaults.runtime_command),
        }
    }
}

fn default_runtime_command() -> String {
    "nimbus-worker --detach".to_string()
}

fn parse_env<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    match std::env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(default),
    }
}
