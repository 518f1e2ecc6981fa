//! Controller Telemetry
//!
//! The task counters, latency accumulators, and the two append-only event
//! files (cluster events and task telemetry) are owned by the controller
//! and passed to the components that report into them.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

/// Fleet-wide dispatch counters.
#[derive(Debug, Default)]
pub struct TaskMetrics {
    tasks_in_flight: AtomicU32,
    sum_latency_ms: AtomicU64,
    latency_samples: AtomicU64,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_started(&self) -> u32 {
        self.tasks_in_flight.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn task_finished(&self) -> u32 {
        self.tasks_in_flight.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn tasks_in_flight(&self) -> u32 {
        self.tasks_in_flight.load(Ordering::SeqCst)
    }

    pub fn record_latency(&self, elapsed_ms: u64) {
        self.sum_latency_ms.fetch_add(elapsed_ms, Ordering::SeqCst);
        self.latency_samples.fetch_add(1, Ordering::SeqCst);
    }

    /// Average dispatch latency in milliseconds, 0 before the first sample.
    pub fn average_latency_ms(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::SeqCst);
        if samples == 0 {
            return 0;
        }
        self.sum_latency_ms.load(Ordering::SeqCst) / samples
    }
}

/// Append-only event file with microsecond timestamps.
///
/// Writes happen inside brief critical sections; a failed write is logged
/// and dropped rather than propagated into the control path.
#[derive(Debug)]
pub struct EventLog {
    file: Mutex<File>,
}

impl EventLog {
    /// Create (truncating) the event file.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, line: impl fmt::Display) {
        let stamp = Utc::now().format("%H:%M:%S%.6f");
        let mut file = self.file.lock().unwrap();
        if let Err(err) = writeln!(file, "{stamp} {line}") {
            warn!(error = %err, "event log write failed");
        }
    }
}

/// Log total outstanding tasks and average latency once per second.
pub fn spawn_task_telemetry(metrics: Arc<TaskMetrics>, log: Arc<EventLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            log.append(format_args!(
                "tasks={}, average_latency(ms)={}",
                metrics.tasks_in_flight(),
                metrics.average_latency_ms()
            ));
        }
    })
}
