//! Application Layer
//!
//! The worker-pool engine and everything that drives it: lifecycle
//! transitions and reconciliation, the request dispatcher, the threshold
//! scaling policy, status snapshots, and the controller-owned telemetry.

pub mod dispatcher;
pub mod pool;
pub mod scaling;
pub mod status;
pub mod telemetry;

pub use crate::dispatcher::{DispatchError, DispatchReply, Dispatcher, ForwardRequest, TaskBody};
pub use crate::pool::{PoolConfig, WorkerPool};
pub use crate::scaling::ThresholdScaling;
pub use crate::status::{ClusterStatus, PoolSnapshot, TaskStatus};
pub use crate::telemetry::{spawn_task_telemetry, EventLog, TaskMetrics};
