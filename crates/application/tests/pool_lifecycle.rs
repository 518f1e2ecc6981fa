//! Worker pool lifecycle integration tests
//!
//! Exercises the pool and dispatcher against the mock platform: cold
//! start, round-robin dispatch, graceful shrink, recovery from Cleaning,
//! shutdown, forward failure, and fatal provisioning.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{HeaderMap, Method};
use nimbus_adapters::MockPlatform;
use nimbus_application::{
    DispatchError, DispatchReply, Dispatcher, EventLog, ForwardRequest, PoolConfig, TaskMetrics,
    ThresholdScaling, WorkerPool,
};
use nimbus_core::Worker;
use nimbus_ports::{CloudPlatform, PlatformKind, ProvisionError, ScalingPolicy};
use tokio::time::sleep;

// ===== Helpers =====

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_event_log() -> Arc<EventLog> {
    let path = std::env::temp_dir().join(format!(
        "nimbus-test-{}-{}.log",
        std::process::id(),
        LOG_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    Arc::new(EventLog::create(path).unwrap())
}

fn build_pool(platform: Arc<dyn CloudPlatform>, worker_cap: usize) -> WorkerPool {
    WorkerPool::new(
        platform,
        PoolConfig { worker_cap },
        Arc::new(TaskMetrics::new()),
        temp_event_log(),
    )
}

fn forward_stub() -> ForwardRequest {
    ForwardRequest {
        method: Method::POST,
        path_and_query: "/run/echo".to_string(),
        headers: HeaderMap::new(),
        body: reqwest::Body::from(Vec::new()),
    }
}

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Platform that provisions instantly onto a loopback address nothing
/// listens on, so forwarding hits a refused connection.
#[derive(Debug)]
struct RefusingPlatform;

#[async_trait]
impl CloudPlatform for RefusingPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Gcp
    }

    async fn create_instance(&self, worker: &Worker) -> Result<(), ProvisionError> {
        worker
            .assign_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .map_err(|e| ProvisionError::Platform(e.to_string()))
    }

    async fn delete_instance(&self, _worker: &Worker) -> Result<(), ProvisionError> {
        Ok(())
    }
}

// ===== Scenario 1: cold start, manual mode =====

#[tokio::test]
async fn test_cold_start_reaches_target() {
    let platform = Arc::new(MockPlatform::new());
    let pool = build_pool(platform.clone(), 8);

    pool.set_target(2);
    wait_for("two running workers", || pool.cluster_status().running == 2).await;

    let status = pool.cluster_status();
    assert_eq!(status.starting, 0);
    assert_eq!(status.cleaning, 0);
    assert_eq!(status.destroying, 0);
    assert_eq!(platform.created(), 2);

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.running.len(), 2);
    // both workers are dispatchable from the ready queue
    let first = pool.rotate_ready().await.unwrap();
    let second = pool.rotate_ready().await.unwrap();
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn test_slow_provisioning_is_observable_as_starting() {
    let platform = Arc::new(MockPlatform::new().with_create_delay(Duration::from_millis(200)));
    let pool = build_pool(platform, 8);

    pool.set_target(1);
    wait_for("worker in starting", || pool.cluster_status().starting == 1).await;
    assert_eq!(pool.cluster_status().running, 0);

    wait_for("worker running", || pool.cluster_status().running == 1).await;
    assert_eq!(pool.cluster_status().starting, 0);
}

// ===== Scenario 2: round-robin dispatch =====

#[tokio::test]
async fn test_dispatch_rotates_across_workers() {
    let platform = Arc::new(MockPlatform::new());
    let pool = build_pool(platform, 8);
    let dispatcher = Dispatcher::new(pool.clone(), None, 5000);

    pool.set_target(3);
    wait_for("three running workers", || pool.cluster_status().running == 3).await;

    let mut assigned = Vec::new();
    for _ in 0..10 {
        match dispatcher.invoke(forward_stub()).await.unwrap() {
            DispatchReply::Direct { worker, body } => {
                assert_eq!(body, format!("hello from {worker}\n"));
                assigned.push(worker);
            }
            DispatchReply::Forwarded { .. } => panic!("mock platform must answer directly"),
        }
    }

    // approximate round-robin: cyclic order with period three
    for i in 0..assigned.len() - 3 {
        assert_eq!(assigned[i], assigned[i + 3], "rotation broke at {i}");
    }
    let mut counts = std::collections::HashMap::new();
    for id in &assigned {
        *counts.entry(id.clone()).or_insert(0u32) += 1;
    }
    let mut per_worker: Vec<u32> = counts.into_values().collect();
    per_worker.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(per_worker, vec![4, 3, 3]);

    // counters restored after every dispatch
    assert_eq!(pool.metrics().tasks_in_flight(), 0);
    for (_, tasks) in pool.task_status().workers {
        assert_eq!(tasks, 0);
    }
}

// ===== Scenario 3: graceful shrink =====

#[tokio::test]
async fn test_shrink_drains_idle_workers_and_keeps_busy_one() {
    let platform = Arc::new(MockPlatform::new());
    let pool = build_pool(platform.clone(), 8);

    pool.set_target(3);
    wait_for("three running workers", || pool.cluster_status().running == 3).await;

    // rotate once so the busy worker sits at the queue tail
    let busy = pool.rotate_ready().await.unwrap();
    busy.task_started();
    busy.task_started();

    pool.set_target(1);
    wait_for("idle workers destroyed", || {
        let status = pool.cluster_status();
        status.running == 1 && status.cleaning == 0 && status.destroying == 0
    })
    .await;

    assert_eq!(platform.created(), 3);
    assert_eq!(platform.deleted(), 2);
    assert_eq!(pool.snapshot().running, vec![busy.id().clone()]);

    // finishing its tasks does not evict the remaining worker
    busy.task_finished();
    busy.task_finished();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.cluster_status().running, 1);
    assert_eq!(platform.deleted(), 2);
}

// ===== Scenario 4: recovery instead of re-provisioning =====

#[tokio::test]
async fn test_regrowth_recovers_cleaning_workers() {
    let platform = Arc::new(MockPlatform::new());
    let pool = build_pool(platform.clone(), 8);

    pool.set_target(3);
    wait_for("three running workers", || pool.cluster_status().running == 3).await;

    // hold a task on every worker so the drain cannot complete while the
    // target dips
    let snapshot = pool.snapshot();
    let holds: Vec<_> = snapshot
        .running
        .iter()
        .map(|id| pool.worker(id).unwrap())
        .collect();
    for worker in &holds {
        worker.task_started();
    }

    pool.set_target(1);
    wait_for("two workers cleaning", || pool.cluster_status().cleaning == 2).await;

    pool.set_target(3);
    wait_for("cleaning workers recovered", || {
        let status = pool.cluster_status();
        status.running == 3 && status.cleaning == 0
    })
    .await;

    // demand rebounded before any teardown: no new instances, none deleted
    assert_eq!(platform.created(), 3);
    assert_eq!(platform.deleted(), 0);

    for worker in &holds {
        worker.task_finished();
    }
}

// ===== Scenario 5: shutdown =====

#[tokio::test]
async fn test_close_drains_the_whole_fleet() {
    let platform = Arc::new(MockPlatform::new());
    let pool = build_pool(platform.clone(), 8);

    pool.set_target(5);
    wait_for("five running workers", || pool.cluster_status().running == 5).await;

    // two workers still hold in-flight tasks when shutdown begins
    let snapshot = pool.snapshot();
    let busy: Vec<_> = snapshot.running[..2]
        .iter()
        .map(|id| pool.worker(id).unwrap())
        .collect();
    for worker in &busy {
        worker.task_started();
    }

    pool.close();
    assert_eq!(pool.target(), 0);
    wait_for("idle workers torn down", || {
        pool.cluster_status().total() == 2
    })
    .await;
    assert_eq!(pool.cluster_status().cleaning, 2);

    for worker in &busy {
        worker.task_finished();
    }
    wait_for("fleet fully destroyed", || pool.cluster_status().total() == 0).await;

    assert_eq!(platform.created(), 5);
    assert_eq!(platform.deleted(), 5);
}

// ===== Scenario 6: forward failure =====

#[tokio::test]
async fn test_forward_failure_surfaces_and_restores_counters() {
    let pool = build_pool(Arc::new(RefusingPlatform), 4);
    // port 1 on loopback refuses connections
    let dispatcher = Dispatcher::new(pool.clone(), None, 1);

    pool.set_target(1);
    wait_for("one running worker", || pool.cluster_status().running == 1).await;

    let err = dispatcher.invoke(forward_stub()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Forward(_)), "got {err:?}");

    // the worker stays Running and every counter is restored
    assert_eq!(pool.cluster_status().running, 1);
    assert_eq!(pool.metrics().tasks_in_flight(), 0);
    let worker = pool.worker(&pool.snapshot().running[0]).unwrap();
    assert_eq!(worker.num_task(), 0);
}

// ===== Auto mode grows under load =====

#[tokio::test]
async fn test_auto_scaling_grows_under_load() {
    let platform = Arc::new(MockPlatform::new());
    let pool = build_pool(platform, 8);
    // aggressive watermark so a single in-flight task triggers growth
    let policy: Arc<dyn ScalingPolicy> = Arc::new(ThresholdScaling::new(0.5, 0.0, 8));
    let dispatcher = Dispatcher::new(pool.clone(), Some(policy), 5000);

    // seed target, as the auto-mode bootstrap does
    pool.set_target(1);
    wait_for("seed worker running", || pool.cluster_status().running == 1).await;

    dispatcher.invoke(forward_stub()).await.unwrap();
    wait_for("fleet grew past the seed", || {
        pool.cluster_status().running == 2
    })
    .await;
    assert_eq!(pool.target(), 2);
}

// ===== Manual mode with an empty fleet =====

#[tokio::test]
async fn test_manual_dispatch_without_workers_fails_fast() {
    let pool = build_pool(Arc::new(MockPlatform::new()), 4);
    let dispatcher = Dispatcher::new(pool.clone(), None, 5000);

    let err = dispatcher.invoke(forward_stub()).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoActiveWorker));
}

// ===== Fatal provisioning failure =====

#[tokio::test]
async fn test_provisioning_failure_is_fatal() {
    let platform = Arc::new(MockPlatform::new());
    platform.fail_creates();
    let pool = build_pool(platform.clone(), 4);
    let mut fatal = pool.fatal();

    pool.set_target(1);
    tokio::time::timeout(Duration::from_secs(5), fatal.changed())
        .await
        .expect("fatal signal")
        .unwrap();

    let reason = fatal.borrow().clone().unwrap();
    assert!(reason.contains("provisioning"), "reason: {reason}");
    // the failed worker never became a partial Running worker
    wait_for("failed worker removed", || pool.cluster_status().total() == 0).await;
    assert_eq!(platform.created(), 0);
}
