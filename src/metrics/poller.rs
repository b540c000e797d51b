//! The per-container polling worker.
//!
//! One worker loops per observed container: snapshot the shared selection,
//! probe the runtime for a single-shot stats reading, append a sample, drive
//! the log tailer, sleep, repeat. Errors inside a cycle are absorbed into the
//! container's status text and retried next cycle; they never stop the
//! worker and never cross container boundaries.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::command::Runner;
use crate::container::ContainerID;
use crate::logs::{LogBuffer, LogTailer, LogWatermark};

use super::{MetricSample, SampleSeries, SharedSelection, build_format, parse_stats};

/// Pause between poll cycles, in the absence of an override.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Every Nth successful sample triggers a derived-view refresh signal.
const REFRESH_EVERY: usize = 2;

/// Signal that a container's derived views should be redrawn.
///
/// Emitted on every even-numbered successful sample, decoupling expensive
/// rendering from every single sample. Delivery is best-effort; a consumer
/// that falls behind loses signals, not data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    pub container_id: ContainerID,
}

/// The container's current human-readable status line.
///
/// Holds the raw stats text after a successful cycle, or the error text after
/// a failed one.
#[derive(Debug, Default)]
pub struct StatusCell {
    text: RwLock<String>,
}

impl StatusCell {
    pub fn set(&self, text: &str) {
        *self.text.write().expect("status cell lock poisoned") = text.to_owned();
    }

    pub fn get(&self) -> String {
        self.text.read().expect("status cell lock poisoned").clone()
    }
}

/// Accumulated per-container state that outlives any single worker.
///
/// Pausing a container stops its worker but keeps this state; resuming spawns
/// a fresh worker over it, so samples, logs, status, and the log watermark
/// all survive stop/start cycles.
#[derive(Debug, Default)]
pub struct PollerState {
    pub series: SampleSeries,
    pub status: StatusCell,
    pub logs: LogBuffer,
    watermark: Mutex<LogWatermark>,
}

impl PollerState {
    fn load_watermark(&self) -> LogWatermark {
        *self.watermark.lock().expect("watermark lock poisoned")
    }

    fn store_watermark(&self, watermark: LogWatermark) {
        *self.watermark.lock().expect("watermark lock poisoned") = watermark;
    }
}

/// Polls one container's stats on a fixed interval.
#[derive(Debug)]
pub struct MetricPoller<R> {
    container_id: ContainerID,
    runner: Arc<R>,
    selection: Arc<SharedSelection>,
    state: Arc<PollerState>,
    refresh_tx: mpsc::Sender<RefreshEvent>,
    poll_interval: Duration,
}

impl<R: Runner> MetricPoller<R> {
    pub fn new(
        container_id: ContainerID,
        runner: Arc<R>,
        selection: Arc<SharedSelection>,
        state: Arc<PollerState>,
        refresh_tx: mpsc::Sender<RefreshEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            container_id,
            runner,
            selection,
            state,
            refresh_tx,
            poll_interval,
        }
    }

    /// Runs poll cycles until the stop signal flips true.
    ///
    /// Cancellation is cooperative: the signal is observed between cycles,
    /// never mid-invocation.
    pub async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        log::debug!(target: "metric poller", "started: container_id={}", self.container_id);
        loop {
            if *stop_rx.borrow() {
                break;
            }
            self.cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        log::debug!(target: "metric poller", "stopped: container_id={}", self.container_id);
    }

    /// One poll cycle: probe, parse, append, tail logs, maybe signal refresh.
    ///
    /// Never fails; both execution and parse errors surface as the current
    /// status text and the next cycle retries.
    pub async fn cycle(&self) {
        let selection = self.selection.load();
        let argv = stats_argv(&self.container_id, &build_format(*selection));

        let raw = match self.runner.run(&argv).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!(
                    target: "metric poller",
                    "stats probe failed: container_id={}, error={err}",
                    self.container_id
                );
                self.state.status.set(&format!("error fetching stats: {err}"));
                return;
            }
        };

        let reading = match parse_stats(&raw) {
            Ok(reading) => reading,
            Err(err) => {
                log::warn!(
                    target: "metric poller",
                    "unparseable stats: container_id={}, error={err}",
                    self.container_id
                );
                self.state.status.set(&format!("error processing stats: {err}"));
                return;
            }
        };

        self.state.series.push(MetricSample::new(
            Utc::now(),
            reading.cpu_percent,
            reading.memory_percent,
        ));
        self.state.status.set(raw.trim());

        self.tail_logs().await;

        if self.state.series.len() % REFRESH_EVERY == 0 {
            let event = RefreshEvent {
                container_id: self.container_id.clone(),
            };
            if self.refresh_tx.try_send(event).is_err() {
                log::trace!(
                    target: "metric poller",
                    "refresh signal dropped: container_id={}",
                    self.container_id
                );
            }
        }
    }

    /// Pulls new log lines once per successful stats cycle.
    ///
    /// A fetch failure is logged and skipped; the watermark stays put so the
    /// next cycle retries the same window.
    async fn tail_logs(&self) {
        let tailer = LogTailer::new(self.container_id.clone(), Arc::clone(&self.runner));
        let watermark = self.state.load_watermark();
        match tailer.fetch(watermark).await {
            Ok((advanced, text)) => {
                self.state.store_watermark(advanced);
                self.state.logs.append(&text);
            }
            Err(err) => {
                log::warn!(
                    target: "metric poller",
                    "log fetch failed: container_id={}, error={err}",
                    self.container_id
                );
            }
        }
    }
}

fn stats_argv(container_id: &ContainerID, format: &str) -> Vec<String> {
    vec![
        "docker".to_owned(),
        "stats".to_owned(),
        container_id.to_string(),
        "--no-stream".to_owned(),
        "--format".to_owned(),
        format.to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExecutionError;
    use crate::metrics::StatSelection;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays a script of stats responses; log fetches always succeed.
    struct ScriptedRunner {
        stats: StdMutex<VecDeque<crate::command::Result<String>>>,
        log_output: String,
        stats_calls: StdMutex<Vec<Vec<String>>>,
        log_calls: StdMutex<usize>,
    }

    impl ScriptedRunner {
        fn new(script: Vec<crate::command::Result<String>>) -> Self {
            Self {
                stats: StdMutex::new(script.into()),
                log_output: String::new(),
                stats_calls: StdMutex::new(Vec::new()),
                log_calls: StdMutex::new(0),
            }
        }

        fn with_log_output(mut self, output: &str) -> Self {
            self.log_output = output.to_owned();
            self
        }

        fn stats_calls(&self) -> Vec<Vec<String>> {
            self.stats_calls.lock().unwrap().clone()
        }

        fn log_calls(&self) -> usize {
            *self.log_calls.lock().unwrap()
        }
    }

    impl Runner for ScriptedRunner {
        async fn run(&self, argv: &[String]) -> crate::command::Result<String> {
            match argv[1].as_str() {
                "stats" => {
                    self.stats_calls.lock().unwrap().push(argv.to_vec());
                    self.stats
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Ok("CPU: 0.00% | Memory: 0.00%".to_owned()))
                }
                "logs" => {
                    *self.log_calls.lock().unwrap() += 1;
                    Ok(self.log_output.clone())
                }
                other => panic!("unexpected command {other}"),
            }
        }
    }

    fn probe_failure() -> crate::command::Result<String> {
        Err(ExecutionError::Failed {
            program: "docker".to_owned(),
            code: Some(1),
            stderr: "Cannot connect to the Docker daemon".to_owned(),
        })
    }

    struct Fixture {
        poller: MetricPoller<ScriptedRunner>,
        runner: Arc<ScriptedRunner>,
        state: Arc<PollerState>,
        selection: Arc<SharedSelection>,
        refresh_rx: mpsc::Receiver<RefreshEvent>,
    }

    fn fixture(runner: ScriptedRunner) -> Fixture {
        let runner = Arc::new(runner);
        let state = Arc::new(PollerState::default());
        let selection = Arc::new(SharedSelection::default());
        let (refresh_tx, refresh_rx) = mpsc::channel(16);
        let poller = MetricPoller::new(
            ContainerID::new("abc123").unwrap(),
            Arc::clone(&runner),
            Arc::clone(&selection),
            Arc::clone(&state),
            refresh_tx,
            Duration::from_millis(1),
        );
        Fixture {
            poller,
            runner,
            state,
            selection,
            refresh_rx,
        }
    }

    #[tokio::test]
    async fn test_sample_count_equals_successful_cycles() {
        let mut fx = fixture(ScriptedRunner::new(vec![
            Ok("CPU: 1.00% | Memory: 2.00%".to_owned()),
            probe_failure(),
            Ok("CPU: 3.00% | Memory: 4.00%".to_owned()),
        ]));

        for _ in 0..3 {
            fx.poller.cycle().await;
        }

        let samples = fx.state.series.snapshot();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].cpu_percent, 1.0);
        assert_eq!(samples[1].memory_percent, 4.0);
        assert!(samples[0].timestamp <= samples[1].timestamp);
        // One refresh for the second successful sample.
        assert_eq!(
            fx.refresh_rx.try_recv().unwrap().container_id.as_ref(),
            "abc123"
        );
        assert!(fx.refresh_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_cycle_surfaces_status_and_appends_nothing() {
        let fx = fixture(ScriptedRunner::new(vec![probe_failure()]));
        fx.poller.cycle().await;

        assert!(fx.state.series.is_empty());
        assert!(fx.state.status.get().contains("error fetching stats"));
        assert_eq!(fx.runner.log_calls(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_stats_surfaces_status() {
        let fx = fixture(ScriptedRunner::new(vec![Ok("garbage".to_owned())]));
        fx.poller.cycle().await;

        assert!(fx.state.series.is_empty());
        assert!(fx.state.status.get().contains("error processing stats"));
    }

    #[tokio::test]
    async fn test_status_holds_raw_text_after_success() {
        let fx = fixture(ScriptedRunner::new(vec![Ok(
            "CPU: 5.50% | Memory: 1.25%\n".to_owned()
        )]));
        fx.poller.cycle().await;
        assert_eq!(fx.state.status.get(), "CPU: 5.50% | Memory: 1.25%");
    }

    #[tokio::test]
    async fn test_selection_change_applies_on_next_cycle() {
        let fx = fixture(ScriptedRunner::new(vec![
            Ok("CPU: 1.00% | Memory: 2.00%".to_owned()),
            Ok("CPU: 1.00%".to_owned()),
        ]));

        fx.poller.cycle().await;
        fx.selection.store(StatSelection {
            cpu: true,
            memory: false,
            net_io: false,
            disk_io: false,
        });
        fx.poller.cycle().await;

        let calls = fx.runner.stats_calls();
        assert_eq!(calls[0][5], "CPU: {{.CPUPerc}} | Memory: {{.MemPerc}}");
        assert_eq!(calls[1][5], "CPU: {{.CPUPerc}}");
    }

    #[tokio::test]
    async fn test_logs_tailed_once_per_successful_cycle() {
        let fx = fixture(
            ScriptedRunner::new(vec![
                Ok("CPU: 1.00% | Memory: 2.00%".to_owned()),
                probe_failure(),
                Ok("CPU: 1.00% | Memory: 2.00%".to_owned()),
            ])
            .with_log_output("a log line\n"),
        );

        for _ in 0..3 {
            fx.poller.cycle().await;
        }

        assert_eq!(fx.runner.log_calls(), 2);
        assert_eq!(fx.state.logs.contents(), "a log line\na log line");
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_signal() {
        let fx = fixture(ScriptedRunner::new(Vec::new()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::clone(&fx.state);

        let worker = tokio::spawn(fx.poller.run(stop_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();
        worker.await.unwrap();

        assert!(!state.series.is_empty());
    }
}
