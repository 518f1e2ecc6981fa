//! Ports - Abstraction Layer
//!
//! This crate defines the traits that separate the pool engine from
//! infrastructure: the cloud platform contract and the scaling policy.
//! Adapters implement them; the application layer consumes them.

pub mod platform;
pub mod scaling;

pub use crate::platform::{CloudPlatform, PlatformKind, ProvisionError};
pub use crate::scaling::{LoadSnapshot, ScalingMode, ScalingPolicy};
