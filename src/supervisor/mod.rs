//! Lifecycle ownership for every collector.
//!
//! The supervisor maps container identity to at most one live polling worker
//! and owns the singleton capture worker. Workers are independently
//! cancellable tasks: stopping sends a cancellation signal and then awaits
//! the worker's join handle, so [`CollectionSupervisor::close_all`] leaves no
//! orphaned background work behind, no matter how many open/pause/resume
//! cycles preceded it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::command::Runner;
use crate::container::{ContainerID, ContainerRef};
use crate::flow::{FlowAggregator, FlowLog, FlowSniffer, SnifferHandle};
use crate::metrics::{
    DEFAULT_POLL_INTERVAL, MetricPoller, PollerState, RefreshEvent, SharedSelection, StatSelection,
};

/// Default bridge interface observed by the capture worker.
pub const DEFAULT_INTERFACE: &str = "docker0";

/// How many refresh signals may queue before new ones are dropped.
const REFRESH_BUFFER: usize = 64;

/// Tunable collection parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pause between poll cycles for every container worker.
    pub poll_interval: Duration,
    /// Interface handed to the capture subprocess.
    pub capture_interface: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            capture_interface: DEFAULT_INTERFACE.to_owned(),
        }
    }
}

/// A spawned polling worker and its cancellation signal.
#[derive(Debug)]
struct Worker {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Worker {
    fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    async fn stop(self) {
        self.signal_stop();
        if let Err(err) = self.join.await {
            log::warn!(target: "supervisor", "poller worker panicked: {err}");
        }
    }
}

/// One container's registration: retained state plus the current worker slot.
///
/// The state survives pause/resume; the worker is recreated, never resumed.
#[derive(Debug)]
struct PollerEntry {
    container: ContainerRef,
    state: Arc<PollerState>,
    worker: Mutex<Option<Worker>>,
}

impl PollerEntry {
    fn is_running(&self) -> bool {
        self.worker
            .lock()
            .expect("worker slot lock poisoned")
            .as_ref()
            .is_some_and(|worker| !worker.join.is_finished())
    }

    fn take_worker(&self) -> Option<Worker> {
        self.worker.lock().expect("worker slot lock poisoned").take()
    }

    fn put_worker(&self, worker: Worker) {
        *self.worker.lock().expect("worker slot lock poisoned") = Some(worker);
    }
}

/// Owns every live collector: one poller per opened container, one sniffer.
pub struct CollectionSupervisor<R> {
    runner: Arc<R>,
    config: Config,
    selection: Arc<SharedSelection>,
    pollers: DashMap<ContainerID, Arc<PollerEntry>>,
    flows: Arc<FlowLog>,
    capture: Mutex<Option<SnifferHandle>>,
    refresh_tx: mpsc::Sender<RefreshEvent>,
}

impl<R: Runner + 'static> CollectionSupervisor<R> {
    /// Creates the supervisor and the receiver for all refresh signals.
    pub fn new(runner: Arc<R>, config: Config) -> (Self, mpsc::Receiver<RefreshEvent>) {
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_BUFFER);
        let supervisor = Self {
            runner,
            config,
            selection: Arc::new(SharedSelection::default()),
            pollers: DashMap::new(),
            flows: Arc::new(FlowLog::default()),
            capture: Mutex::new(None),
            refresh_tx,
        };
        (supervisor, refresh_rx)
    }

    /// Opens a collection view for a container, spawning its polling worker.
    ///
    /// Idempotent per container id: an existing registration is reused as-is
    /// (running or paused), never duplicated.
    pub fn open(&self, container: ContainerRef) -> Arc<PollerState> {
        let entry = self.pollers.entry(container.id.clone()).or_insert_with(|| {
            log::debug!(target: "supervisor", "opening container_id={}", container.id);
            let entry = Arc::new(PollerEntry {
                container,
                state: Arc::new(PollerState::default()),
                worker: Mutex::new(None),
            });
            entry.put_worker(self.spawn_worker(&entry));
            entry
        });

        Arc::clone(&entry.state)
    }

    /// Stops a container's worker and waits for it to exit.
    ///
    /// Accumulated samples, logs, status, and the log watermark are all
    /// retained. Returns false for an unknown id.
    pub async fn pause(&self, container_id: &str) -> bool {
        let Some(entry) = self.pollers.get(container_id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        if let Some(worker) = entry.take_worker() {
            worker.stop().await;
            log::debug!(target: "supervisor", "paused container_id={container_id}");
        }
        true
    }

    /// Restarts a paused container's loop over its retained state.
    ///
    /// The worker is recreated, not resumed; it picks up where the retained
    /// series and watermark left off. A still-running container is left
    /// alone. Returns false for an unknown id.
    pub fn resume(&self, container_id: &str) -> bool {
        let Some(entry) = self.pollers.get(container_id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        if entry.is_running() {
            return true;
        }
        entry.put_worker(self.spawn_worker(&entry));
        log::debug!(target: "supervisor", "resumed container_id={container_id}");
        true
    }

    fn spawn_worker(&self, entry: &PollerEntry) -> Worker {
        let poller = MetricPoller::new(
            entry.container.id.clone(),
            Arc::clone(&self.runner),
            Arc::clone(&self.selection),
            Arc::clone(&entry.state),
            self.refresh_tx.clone(),
            self.config.poll_interval,
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(poller.run(stop_rx));
        Worker { stop_tx, join }
    }

    /// Starts the singleton capture worker on the configured interface.
    ///
    /// Reuses a live capture if one exists. A startup failure leaves the
    /// capture stopped; callers must not retry.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::flow::CaptureError`] if the capture subprocess
    /// cannot be spawned.
    pub fn start_capture(&self) -> crate::flow::Result<()> {
        let mut slot = self.capture.lock().expect("capture slot lock poisoned");
        if slot.as_ref().is_some_and(SnifferHandle::is_running) {
            return Ok(());
        }

        let sniffer = FlowSniffer::new(&self.config.capture_interface, Arc::clone(&self.flows));
        *slot = Some(sniffer.start()?);
        Ok(())
    }

    /// Stops the capture worker, if live, and waits for it to exit.
    pub async fn stop_capture(&self) {
        let handle = self
            .capture
            .lock()
            .expect("capture slot lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// Stops every poller and the capture worker, awaiting confirmed
    /// termination of each. After this returns, no background work spawned
    /// by this supervisor is still running.
    pub async fn close_all(&self) {
        let workers: Vec<(ContainerID, Option<Worker>)> = self
            .pollers
            .iter()
            .map(|entry| (entry.key().clone(), entry.take_worker()))
            .collect();

        for (container_id, worker) in workers {
            if let Some(worker) = worker {
                worker.stop().await;
                log::debug!(target: "supervisor", "closed container_id={container_id}");
            }
        }

        self.stop_capture().await;
        log::debug!(target: "supervisor", "all collectors stopped");
    }

    /// The retained state for a container, if it has been opened.
    pub fn state(&self, container_id: &str) -> Option<Arc<PollerState>> {
        self.pollers
            .get(container_id)
            .map(|entry| Arc::clone(&entry.state))
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.pollers
            .get(container_id)
            .is_some_and(|entry| entry.is_running())
    }

    /// Snapshot of every opened container's identity metadata.
    pub fn containers(&self) -> Vec<ContainerRef> {
        self.pollers
            .iter()
            .map(|entry| entry.container.clone())
            .collect()
    }

    pub fn selection(&self) -> Arc<StatSelection> {
        self.selection.load()
    }

    /// Replaces the process-wide stat selection; pollers pick it up at their
    /// next cycle.
    pub fn set_selection(&self, selection: StatSelection) {
        self.selection.store(selection);
    }

    /// Aggregate query handle over the captured flow records.
    pub fn aggregator(&self) -> FlowAggregator {
        FlowAggregator::new(Arc::clone(&self.flows))
    }

    pub fn flows(&self) -> Arc<FlowLog> {
        Arc::clone(&self.flows)
    }
}
