//! Worker Pool Engine
//!
//! Owns every worker record in four state-indexed maps and converges the
//! fleet on the operator target. Map mutations are brief critical
//! sections under one mutex; provisioning, deprovisioning, and drain
//! waits run in independent tasks that re-acquire it per step.
//! Reconciliation is driven by a single control task consuming pool
//! events, so passes never race each other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nimbus_core::{Worker, WorkerId, WorkerState};
use nimbus_ports::{CloudPlatform, LoadSnapshot, PlatformKind, ProvisionError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::status::{ClusterStatus, PoolSnapshot, TaskStatus};
use crate::telemetry::{EventLog, TaskMetrics};

const DRAIN_POLL: Duration = Duration::from_secs(1);

/// Triggers for a reconcile pass.
#[derive(Debug, Clone, Copy)]
enum PoolEvent {
    TargetChanged,
    WorkerRunning,
    WorkerGone,
}

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Fleet size bound; also the ready-queue capacity.
    pub worker_cap: usize,
}

#[derive(Default)]
struct PoolState {
    target: usize,
    next_seq: u64,
    starting: HashMap<WorkerId, Arc<Worker>>,
    running: HashMap<WorkerId, Arc<Worker>>,
    cleaning: HashMap<WorkerId, Arc<Worker>>,
    destroying: HashMap<WorkerId, Arc<Worker>>,
}

impl PoolState {
    fn total(&self) -> usize {
        self.starting.len() + self.running.len() + self.cleaning.len() + self.destroying.len()
    }

    fn active(&self) -> usize {
        self.starting.len() + self.running.len()
    }
}

/// Handle to the worker pool. Cheap to clone; all clones share the same
/// fleet.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    platform: Arc<dyn CloudPlatform>,
    state: Mutex<PoolState>,
    ready_tx: mpsc::Sender<Arc<Worker>>,
    ready_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<Worker>>>,
    events: mpsc::UnboundedSender<PoolEvent>,
    fatal_tx: watch::Sender<Option<String>>,
    metrics: Arc<TaskMetrics>,
    cluster_log: Arc<EventLog>,
    worker_cap: usize,
}

impl WorkerPool {
    pub fn new(
        platform: Arc<dyn CloudPlatform>,
        config: PoolConfig,
        metrics: Arc<TaskMetrics>,
        cluster_log: Arc<EventLog>,
    ) -> Self {
        let (ready_tx, ready_rx) = mpsc::channel(config.worker_cap.max(1));
        let (events, event_rx) = mpsc::unbounded_channel();
        let (fatal_tx, _) = watch::channel(None);

        let inner = Arc::new(PoolInner {
            platform,
            state: Mutex::new(PoolState {
                next_seq: 1,
                ..PoolState::default()
            }),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
            events,
            fatal_tx,
            metrics,
            cluster_log,
            worker_cap: config.worker_cap,
        });

        tokio::spawn(control_loop(Arc::clone(&inner), event_rx));
        info!(platform = %inner.platform.kind(), "worker pool ready");

        Self { inner }
    }

    /// Set the desired count of Starting plus Running workers and trigger
    /// reconciliation. Targets above the worker cap are clamped.
    pub fn set_target(&self, target: usize) {
        let target = if target > self.inner.worker_cap {
            warn!(
                requested = target,
                cap = self.inner.worker_cap,
                "target above worker cap, clamping"
            );
            self.inner.worker_cap
        } else {
            target
        };

        {
            let mut st = self.inner.lock();
            st.target = target;
            info!(new_target = target, "set cluster target");
            self.inner.cluster_log.append(format_args!("set target={target}"));
        }
        let _ = self.inner.events.send(PoolEvent::TargetChanged);
    }

    /// Begin shutdown: drive every worker out of the fleet. Returns
    /// immediately; completion is observable through the status
    /// snapshots.
    pub fn close(&self) {
        info!("closing worker pool");
        self.set_target(0);
    }

    pub fn target(&self) -> usize {
        self.inner.lock().target
    }

    pub fn platform_kind(&self) -> PlatformKind {
        self.inner.platform.kind()
    }

    pub fn metrics(&self) -> Arc<TaskMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Workers in Starting or Running.
    pub fn active_workers(&self) -> usize {
        self.inner.lock().active()
    }

    /// Resolves once a provisioning failure has made the controller
    /// unhealthy; the payload describes the failure.
    pub fn fatal(&self) -> watch::Receiver<Option<String>> {
        self.inner.fatal_tx.subscribe()
    }

    /// Dispatcher selection: receive the queue-head worker and re-send it
    /// to the tail, yielding an approximate round-robin without taking
    /// workers out of rotation while they serve.
    pub async fn rotate_ready(&self) -> Option<Arc<Worker>> {
        let mut rx = self.inner.ready_rx.lock().await;
        let worker = rx.recv().await?;
        // at most one queue slot per Running worker, so the re-send
        // cannot block while the receiver half is held
        let _ = self.inner.ready_tx.send(Arc::clone(&worker)).await;
        Some(worker)
    }

    pub fn load_snapshot(&self) -> LoadSnapshot {
        let st = self.inner.lock();
        LoadSnapshot {
            tasks_in_flight: self.inner.metrics.tasks_in_flight(),
            active_workers: st.active(),
            target: st.target,
            worker_cap: self.inner.worker_cap,
        }
    }

    pub fn cluster_status(&self) -> ClusterStatus {
        let st = self.inner.lock();
        ClusterStatus {
            starting: st.starting.len(),
            running: st.running.len(),
            cleaning: st.cleaning.len(),
            destroying: st.destroying.len(),
        }
    }

    pub fn task_status(&self) -> TaskStatus {
        let st = self.inner.lock();
        let active = st.active();
        let running_tasks: u32 = st.running.values().map(|w| w.num_task()).sum();

        let mut workers = BTreeMap::new();
        for worker in st
            .starting
            .values()
            .chain(st.running.values())
            .chain(st.cleaning.values())
            .chain(st.destroying.values())
        {
            workers.insert(worker.id().clone(), worker.num_task());
        }

        TaskStatus {
            total_tasks: self.inner.metrics.tasks_in_flight(),
            task_per_worker: if active > 0 {
                running_tasks / active as u32
            } else {
                0
            },
            workers,
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        fn ids(map: &HashMap<WorkerId, Arc<Worker>>) -> Vec<WorkerId> {
            let mut ids: Vec<_> = map.keys().cloned().collect();
            ids.sort();
            ids
        }

        let st = self.inner.lock();
        PoolSnapshot {
            target: st.target,
            starting: ids(&st.starting),
            running: ids(&st.running),
            cleaning: ids(&st.cleaning),
            destroying: ids(&st.destroying),
        }
    }

    /// Look up a live worker record by id.
    pub fn worker(&self, id: &WorkerId) -> Option<Arc<Worker>> {
        let st = self.inner.lock();
        st.starting
            .get(id)
            .or_else(|| st.running.get(id))
            .or_else(|| st.cleaning.get(id))
            .or_else(|| st.destroying.get(id))
            .cloned()
    }
}

async fn control_loop(inner: Arc<PoolInner>, mut events: mpsc::UnboundedReceiver<PoolEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "reconciling cluster");
        inner.update_cluster().await;
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap()
    }

    fn log_transition(&self, st: &PoolState, id: &WorkerId, label: &str) {
        self.cluster_log.append(format_args!(
            "{id}: {label} [target={}, starting={}, running={}, cleaning={}, destroying={}]",
            st.target,
            st.starting.len(),
            st.running.len(),
            st.cleaning.len(),
            st.destroying.len()
        ));
    }

    /// One reconcile pass: grow, then evict, then recover. The lock is
    /// released between stages; state drift across stages is reconverged
    /// by the next event.
    async fn update_cluster(self: &Arc<Self>) {
        loop {
            // Stage 1: grow toward the target. Further reconciliation is
            // deferred until the new workers finish Starting.
            let scale_up = {
                let st = self.lock();
                st.target.saturating_sub(st.total())
            };
            if scale_up > 0 {
                for _ in 0..scale_up {
                    self.start_new_worker();
                }
                return;
            }

            // Stage 2: evict queue-head workers beyond the target. Workers
            // already leaving (or not yet Running) do not count.
            let to_clean = {
                let st = self.lock();
                st.total()
                    .saturating_sub(st.target)
                    .saturating_sub(st.cleaning.len())
                    .saturating_sub(st.destroying.len())
                    .saturating_sub(st.starting.len())
            };
            if to_clean > 0 {
                for _ in 0..to_clean {
                    let worker = {
                        let mut rx = self.ready_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(worker) = worker else { return };
                    self.clean_worker(worker);
                }
                continue;
            }

            // Stage 3: demand rebounded mid-shrink; revive Cleaning
            // workers instead of provisioning fresh ones. The shortfall is
            // re-read after every promotion.
            loop {
                let candidate = {
                    let st = self.lock();
                    if st.target.saturating_sub(st.active()) == 0 {
                        break;
                    }
                    st.cleaning.values().next().cloned()
                };
                let Some(worker) = candidate else { break };
                self.recover_worker(worker).await;
            }
            return;
        }
    }

    /// ∅ → Starting
    fn start_new_worker(self: &Arc<Self>) {
        let worker = {
            let mut st = self.lock();
            let seq = st.next_seq;
            st.next_seq += 1;
            let worker = self.platform.new_worker(seq);
            st.starting.insert(worker.id().clone(), Arc::clone(&worker));
            info!(worker_id = %worker.id(), "starting new worker");
            self.log_transition(&st, worker.id(), WorkerState::Starting.as_str());
            worker
        };

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            match pool.platform.create_instance(&worker).await {
                Ok(()) => pool.worker_started(worker).await,
                Err(err) => pool.provision_failed(worker, err),
            }
        });
    }

    /// Starting → Running
    async fn worker_started(&self, worker: Arc<Worker>) {
        {
            let mut st = self.lock();
            st.starting.remove(worker.id());
            st.running.insert(worker.id().clone(), Arc::clone(&worker));
            self.log_transition(&st, worker.id(), WorkerState::Running.as_str());
        }

        info!(worker_id = %worker.id(), "worker ready");
        if self.ready_tx.send(worker).await.is_ok() {
            let _ = self.events.send(PoolEvent::WorkerRunning);
        }
    }

    fn provision_failed(&self, worker: Arc<Worker>, err: ProvisionError) {
        {
            let mut st = self.lock();
            st.starting.remove(worker.id());
        }
        error!(worker_id = %worker.id(), error = %err, "worker provisioning failed");
        let _ = self
            .fatal_tx
            .send(Some(format!("provisioning {} failed: {err}", worker.id())));
    }

    /// Running → Cleaning; spawns the drain task.
    fn clean_worker(self: &Arc<Self>, worker: Arc<Worker>) {
        {
            let mut st = self.lock();
            if st.running.remove(worker.id()).is_none() {
                return;
            }
            st.cleaning.insert(worker.id().clone(), Arc::clone(&worker));
            info!(worker_id = %worker.id(), tasks = worker.num_task(), "cleaning worker");
            self.log_transition(&st, worker.id(), WorkerState::Cleaning.as_str());
        }

        let pool = Arc::clone(self);
        tokio::spawn(async move { pool.drain_worker(worker).await });
    }

    /// Cleaning → Running (recovery); the drain task notices the missing
    /// map entry and exits without destroying.
    async fn recover_worker(&self, worker: Arc<Worker>) {
        {
            let mut st = self.lock();
            if st.cleaning.remove(worker.id()).is_none() {
                return;
            }
            st.running.insert(worker.id().clone(), Arc::clone(&worker));
            info!(worker_id = %worker.id(), "recovering worker");
            self.log_transition(&st, worker.id(), WorkerState::Running.as_str());
        }

        let _ = self.ready_tx.send(worker).await;
    }

    /// Wait out the worker's in-flight tasks, then Cleaning → Destroying.
    /// Membership and the task count are checked under the same lock so a
    /// recovered worker can never be torn down.
    async fn drain_worker(self: &Arc<Self>, worker: Arc<Worker>) {
        loop {
            {
                let mut st = self.lock();
                if !st.cleaning.contains_key(worker.id()) {
                    return;
                }
                if worker.num_task() == 0 {
                    st.cleaning.remove(worker.id());
                    st.destroying
                        .insert(worker.id().clone(), Arc::clone(&worker));
                    self.log_transition(&st, worker.id(), WorkerState::Destroying.as_str());
                    break;
                }
                debug!(worker_id = %worker.id(), tasks = worker.num_task(), "waiting for drain");
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }

        self.destroy_worker(worker).await;
    }

    /// Destroying → ∅ once the platform has released the instance.
    async fn destroy_worker(&self, worker: Arc<Worker>) {
        match self.platform.delete_instance(&worker).await {
            Ok(()) => {
                {
                    let mut st = self.lock();
                    st.destroying.remove(worker.id());
                    self.log_transition(&st, worker.id(), "destroyed");
                }
                info!(worker_id = %worker.id(), "worker destroyed");
                let _ = self.events.send(PoolEvent::WorkerGone);
            }
            Err(err) => {
                // the record stays in Destroying; state maps remain exclusive
                error!(worker_id = %worker.id(), error = %err, "instance release failed");
            }
        }
    }
}
