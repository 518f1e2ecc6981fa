//! Property-based pool invariants
//!
//! Runs arbitrary scripts of set-target and dispatch operations against
//! the mock platform and checks, after every operation settles:
//! state-map exclusivity, convergence on the target, counter restoration,
//! and that instances are never provisioned beyond what the fleet holds.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{HeaderMap, Method};
use nimbus_adapters::MockPlatform;
use nimbus_application::{
    DispatchError, Dispatcher, EventLog, ForwardRequest, PoolConfig, TaskMetrics, WorkerPool,
};
use proptest::prelude::*;
use tokio::time::sleep;

const WORKER_CAP: usize = 8;

#[derive(Debug, Clone)]
enum Op {
    SetTarget(usize),
    Dispatch,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..=5).prop_map(Op::SetTarget),
        2 => Just(Op::Dispatch),
    ]
}

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_event_log() -> Arc<EventLog> {
    let path = std::env::temp_dir().join(format!(
        "nimbus-prop-{}-{}.log",
        std::process::id(),
        LOG_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    Arc::new(EventLog::create(path).unwrap())
}

fn forward_stub() -> ForwardRequest {
    ForwardRequest {
        method: Method::POST,
        path_and_query: "/run/echo".to_string(),
        headers: HeaderMap::new(),
        body: reqwest::Body::from(Vec::new()),
    }
}

/// Wait until the fleet has converged on the current target: no workers
/// in transition and exactly `target` active. Panics when convergence
/// does not happen, which is the convergence property itself.
async fn settle(pool: &WorkerPool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = pool.snapshot();
        if snapshot.starting.is_empty()
            && snapshot.cleaning.is_empty()
            && snapshot.destroying.is_empty()
            && snapshot.running.len() == snapshot.target
        {
            return;
        }
        if Instant::now() > deadline {
            panic!("fleet did not converge: {snapshot:?}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Ids observed alive and ids observed gone, across one script.
#[derive(Default)]
struct IdHistory {
    seen: HashSet<String>,
    retired: HashSet<String>,
}

fn assert_invariants(pool: &WorkerPool, platform: &MockPlatform, history: &mut IdHistory) {
    let snapshot = pool.snapshot();

    // P1: each worker id appears in exactly one state map
    let ids: Vec<_> = snapshot.all_ids().collect();
    let distinct: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), distinct.len(), "id present in two maps: {snapshot:?}");

    // ids are never reused across the controller lifetime
    let current: HashSet<String> = snapshot.all_ids().map(|id| id.to_string()).collect();
    for id in &current {
        assert!(!history.retired.contains(id), "worker id {id} was reused");
    }
    for id in &history.seen {
        if !current.contains(id) {
            history.retired.insert(id.clone());
        }
    }
    history.seen.extend(current);

    // P4: provisioned minus released equals the live fleet
    let live = (platform.created() - platform.deleted()) as usize;
    assert_eq!(live, snapshot.total(), "instance leak: {snapshot:?}");

    // P3: all dispatch counters returned to baseline
    assert_eq!(pool.metrics().tasks_in_flight(), 0);
    for (worker, tasks) in pool.task_status().workers {
        assert_eq!(tasks, 0, "worker {worker} kept a task counted");
    }
}

async fn run_script(ops: Vec<Op>) {
    let platform = Arc::new(MockPlatform::new());
    let pool = WorkerPool::new(
        platform.clone(),
        PoolConfig {
            worker_cap: WORKER_CAP,
        },
        Arc::new(TaskMetrics::new()),
        temp_event_log(),
    );
    let dispatcher = Dispatcher::new(pool.clone(), None, 5000);
    let mut history = IdHistory::default();

    for op in ops {
        match op {
            Op::SetTarget(target) => pool.set_target(target),
            Op::Dispatch => match dispatcher.invoke(forward_stub()).await {
                Ok(_) | Err(DispatchError::NoActiveWorker) => {}
                Err(err) => panic!("unexpected dispatch error: {err}"),
            },
        }
        settle(&pool).await;
        assert_invariants(&pool, &platform, &mut history);
    }

    // P2 once more at the end of the script
    settle(&pool).await;
    let status = pool.cluster_status();
    assert_eq!(status.active(), pool.target());
    assert_eq!(status.cleaning, 0);
    assert_eq!(status.destroying, 0);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        .. ProptestConfig::default()
    })]

    #[test]
    fn pool_invariants_hold_for_any_script(ops in prop::collection::vec(op_strategy(), 1..10)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run_script(ops));
    }
}
