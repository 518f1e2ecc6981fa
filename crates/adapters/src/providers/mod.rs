//! Platform Adapters
//!
//! Each adapter drives its provider's official CLI through
//! `tokio::process::Command` and boots the lambda runtime over SSH once
//! the instance is reachable. The mock adapter fabricates instances for
//! tests and local development.

mod azure;
mod digitalocean;
mod gcp;
mod mock;

pub use azure::AzurePlatform;
pub use digitalocean::DigitalOceanPlatform;
pub use gcp::GcpPlatform;
pub use mock::MockPlatform;

use std::net::IpAddr;
use std::time::Duration;

use nimbus_ports::ProvisionError;
use tokio::process::Command;
use tracing::{debug, warn};

const BOOTSTRAP_ATTEMPTS: u32 = 10;
const BOOTSTRAP_BACKOFF: Duration = Duration::from_secs(5);
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: Duration = Duration::from_secs(5);

/// Run a provider CLI command and return its stdout.
pub(crate) async fn run_cli(program: &str, args: &[&str]) -> Result<String, ProvisionError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| ProvisionError::Command(format!("failed to execute {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProvisionError::Command(format!(
            "{program} {}: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Release an instance, retrying transient failures. A "not found" answer
/// counts as released so the call stays idempotent.
pub(crate) async fn release_instance(program: &str, args: &[&str]) -> Result<(), ProvisionError> {
    let mut last_err = None;
    for attempt in 1..=RELEASE_ATTEMPTS {
        match run_cli(program, args).await {
            Ok(_) => return Ok(()),
            Err(ProvisionError::Command(msg)) if msg.to_lowercase().contains("not found") => {
                return Ok(());
            }
            Err(err) => {
                warn!(error = %err, attempt, "instance release failed");
                last_err = Some(err);
                if attempt < RELEASE_ATTEMPTS {
                    tokio::time::sleep(RELEASE_BACKOFF).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ProvisionError::Platform("instance release failed".into())))
}

/// Start the lambda runtime on a freshly provisioned instance.
///
/// SSH needs several attempts on most providers: the address is routable
/// before sshd accepts connections.
pub(crate) async fn bootstrap_runtime(ip: IpAddr, command: &str) -> Result<(), ProvisionError> {
    let target = ip.to_string();
    let mut last_err = String::new();

    for attempt in 1..=BOOTSTRAP_ATTEMPTS {
        let output = Command::new("ssh")
            .args(["-o", "StrictHostKeyChecking=no", &target, "-C", command])
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                debug!(%ip, attempt, "worker runtime started");
                return Ok(());
            }
            Ok(out) => last_err = String::from_utf8_lossy(&out.stderr).trim().to_string(),
            Err(err) => last_err = err.to_string(),
        }

        if attempt < BOOTSTRAP_ATTEMPTS {
            warn!(%ip, attempt, "worker runtime not reachable yet, retrying");
            tokio::time::sleep(BOOTSTRAP_BACKOFF).await;
        }
    }

    Err(ProvisionError::Bootstrap(format!("{target}: {last_err}")))
}

/// Instance name derived from the worker id, e.g. `nimbus-worker-3`.
pub(crate) fn instance_name(worker_id: &nimbus_core::WorkerId) -> String {
    format!("nimbus-{worker_id}")
}

/// Parse the address a provider CLI printed, taking the last non-empty
/// line so informational output above it is ignored.
pub(crate) fn parse_ip(stdout: &str) -> Result<IpAddr, ProvisionError> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
        .ok_or_else(|| ProvisionError::Address(stdout.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_takes_last_line() {
        let out = "Created instance nimbus-worker-1\n10.128.0.7\n";
        assert_eq!(parse_ip(out).unwrap().to_string(), "10.128.0.7");
    }

    #[test]
    fn test_parse_ip_rejects_garbage() {
        assert!(parse_ip("no address here").is_err());
        assert!(parse_ip("").is_err());
    }

    #[test]
    fn test_instance_name_carries_worker_id() {
        let id = nimbus_core::WorkerId::from_seq(7);
        assert_eq!(instance_name(&id), "nimbus-worker-7");
    }
}
