//! Logging initialization for the controller process.
//!
//! # Environment Variables
//!
//! - `NIMBUS_LOG` - Log filter (overrides RUST_LOG)
//! - `NIMBUS_LOG_FILE` - Path to a diagnostic log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber. The returned guard must be held for
/// the lifetime of the process so buffered file output is flushed.
pub fn init() -> Option<WorkerGuard> {
    let filter = std::env::var("NIMBUS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::new(filter);

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match std::env::var("NIMBUS_LOG_FILE").ok().map(PathBuf::from) {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "nimbus.log".to_string());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
