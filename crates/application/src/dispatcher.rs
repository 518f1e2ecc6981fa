//! Request Dispatcher
//!
//! Selects a Running worker by rotating the ready queue, counts the task
//! in flight, and forwards the invocation to the worker runtime. Counters
//! are restored by a drop guard on every path, including mid-stream
//! abandonment of the response body.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use http::header::{HeaderMap, HeaderName};
use http::{Method, StatusCode};
use nimbus_core::{Worker, WorkerId};
use nimbus_ports::{PlatformKind, ScalingPolicy};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::pool::WorkerPool;
use crate::telemetry::TaskMetrics;

/// Hop-by-hop headers are stripped in both directions.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Dispatch error
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no active worker")]
    NoActiveWorker,

    #[error("worker queue closed")]
    QueueClosed,

    #[error("worker {0} has no assigned address")]
    NoAddress(WorkerId),

    #[error("forwarding failed: {0}")]
    Forward(#[from] reqwest::Error),
}

/// Incoming invocation, already reduced to what forwarding needs.
pub struct ForwardRequest {
    pub method: Method,
    /// Full path with query, e.g. `/run/echo?x=1`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
}

/// Dispatch outcome.
pub enum DispatchReply {
    /// The mock platform answers directly, without a remote hop.
    Direct { worker: WorkerId, body: String },
    /// Response streamed back from the worker runtime.
    Forwarded {
        status: StatusCode,
        headers: HeaderMap,
        body: TaskBody,
    },
}

impl std::fmt::Debug for DispatchReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchReply::Direct { worker, body } => f
                .debug_struct("Direct")
                .field("worker", worker)
                .field("body", body)
                .finish(),
            DispatchReply::Forwarded {
                status, headers, ..
            } => f
                .debug_struct("Forwarded")
                .field("status", status)
                .field("headers", headers)
                .field("body", &"<TaskBody>")
                .finish(),
        }
    }
}

/// Response body stream that keeps the task counted until it is fully
/// consumed or dropped.
pub struct TaskBody {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    _guard: TaskGuard,
}

impl Stream for TaskBody {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

/// Restores `num_task`, the fleet counter, and records latency when the
/// dispatch finishes, whichever way it finishes.
struct TaskGuard {
    worker: Arc<Worker>,
    metrics: Arc<TaskMetrics>,
    started: Instant,
}

impl TaskGuard {
    fn begin(worker: Arc<Worker>, metrics: Arc<TaskMetrics>) -> Self {
        worker.task_started();
        metrics.task_started();
        Self {
            worker,
            metrics,
            started: Instant::now(),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.worker.task_finished();
        self.metrics.task_finished();
        self.metrics
            .record_latency(self.started.elapsed().as_millis() as u64);
    }
}

/// Load-balancing request forwarder
pub struct Dispatcher {
    pool: WorkerPool,
    client: reqwest::Client,
    policy: Option<Arc<dyn ScalingPolicy>>,
    worker_port: u16,
}

impl Dispatcher {
    /// `policy` is consulted on every dispatch in auto mode; pass `None`
    /// for manual target control.
    pub fn new(pool: WorkerPool, policy: Option<Arc<dyn ScalingPolicy>>, worker_port: u16) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
            policy,
            worker_port,
        }
    }

    /// Route one invocation to a Running worker.
    ///
    /// In manual mode an empty fleet fails fast; in auto mode the call
    /// waits on the ready queue while the first worker finishes Starting.
    pub async fn invoke(&self, request: ForwardRequest) -> Result<DispatchReply, DispatchError> {
        if self.policy.is_none() && self.pool.active_workers() == 0 {
            return Err(DispatchError::NoActiveWorker);
        }

        let worker = self
            .pool
            .rotate_ready()
            .await
            .ok_or(DispatchError::QueueClosed)?;
        let guard = TaskGuard::begin(Arc::clone(&worker), self.pool.metrics());

        if let Some(policy) = &self.policy {
            let snapshot = self.pool.load_snapshot();
            if let Some(target) = policy.plan(&snapshot) {
                if target != snapshot.target {
                    self.pool.set_target(target);
                }
            }
        }

        if self.pool.platform_kind() == PlatformKind::Mock {
            return Ok(DispatchReply::Direct {
                worker: worker.id().clone(),
                body: format!("hello from {}\n", worker.id()),
            });
        }

        let ip = worker
            .ip()
            .ok_or_else(|| DispatchError::NoAddress(worker.id().clone()))?;
        let url = format!(
            "http://{ip}:{}{}",
            self.worker_port, request.path_and_query
        );

        let request_id = Uuid::new_v4();
        debug!(%request_id, worker_id = %worker.id(), %url, "forwarding invocation");

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        // reqwest rewrites Host from the worker URL
        headers.remove(http::header::HOST);

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        Ok(DispatchReply::Forwarded {
            status,
            headers,
            body: TaskBody {
                inner: response.bytes_stream().boxed(),
                _guard: guard,
            },
        })
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(HeaderName::from_static(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_by_hop_keeps_end_to_end_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-request-id", "abc".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("x-request-id").unwrap(), "abc");
    }
}
