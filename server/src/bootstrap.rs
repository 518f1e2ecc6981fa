//! Controller bootstrap: configuration, platform selection, pool wiring.

use std::sync::Arc;

use nimbus_adapters::config::AppConfig;
use nimbus_adapters::provider_factory::build_platform;
use nimbus_application::{
    spawn_task_telemetry, Dispatcher, EventLog, PoolConfig, TaskMetrics, ThresholdScaling,
    WorkerPool,
};
use nimbus_ports::{ScalingMode, ScalingPolicy};
use tracing::info;

/// Everything the HTTP layer needs, built once at startup.
pub struct ServerComponents {
    pub config: AppConfig,
    pub pool: WorkerPool,
    pub dispatcher: Arc<Dispatcher>,
}

/// Assemble the controller from configuration.
///
/// Fails (and the process refuses to start) on invalid configuration or
/// unwritable event files.
pub fn initialize_server() -> Result<ServerComponents, Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    let platform = build_platform(&config);
    let metrics = Arc::new(TaskMetrics::new());
    let cluster_log = Arc::new(EventLog::create(&config.logs.cluster_log_path)?);
    let task_log = Arc::new(EventLog::create(&config.logs.task_log_path)?);

    let pool = WorkerPool::new(
        platform,
        PoolConfig {
            worker_cap: config.worker_cap,
        },
        Arc::clone(&metrics),
        cluster_log,
    );
    let _telemetry = spawn_task_telemetry(metrics, task_log);

    let policy: Option<Arc<dyn ScalingPolicy>> = match config.scaling {
        ScalingMode::Auto => {
            // the first dispatch blocks until this seed worker is up
            pool.set_target(1);
            Some(Arc::new(ThresholdScaling::new(
                config.thresholds.scale_up_ratio,
                config.thresholds.scale_down_ratio,
                config.worker_cap,
            )))
        }
        ScalingMode::Manual => None,
    };

    let dispatcher = Arc::new(Dispatcher::new(pool.clone(), policy, config.worker_port));

    info!(
        platform = %config.platform,
        scaling = %config.scaling,
        worker_cap = config.worker_cap,
        "controller initialized"
    );

    Ok(ServerComponents {
        config,
        pool,
        dispatcher,
    })
}
