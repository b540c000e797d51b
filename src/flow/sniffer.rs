//! The packet-capture worker.
//!
//! Runs the capture CLI in line-buffered, name-resolution-free mode on one
//! interface and reduces each emitted line to a [`FlowRecord`] when it
//! contains at least two IPv4 literals. Capture is all-or-nothing: a startup
//! failure stops this collector without retry and touches nothing else.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::command::SystemRunner;

use super::error::Result;
use super::{FlowLog, FlowRecord};

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").expect("IPv4 pattern is valid")
});

/// Passive flow collector over one bridge interface.
#[derive(Debug)]
pub struct FlowSniffer {
    interface: String,
    log: Arc<FlowLog>,
}

impl FlowSniffer {
    pub fn new(interface: impl Into<String>, log: Arc<FlowLog>) -> Self {
        Self {
            interface: interface.into(),
            log,
        }
    }

    /// Starts the capture subprocess and its read-loop worker.
    ///
    /// # Errors
    ///
    /// Returns a [`super::CaptureError`] if the capture tool cannot be
    /// spawned (missing binary, insufficient privilege, bad interface). The
    /// sniffer then stays stopped; callers must not retry.
    pub fn start(self) -> Result<SnifferHandle> {
        let argv = capture_argv(&self.interface);
        let mut child = SystemRunner::spawn_streaming(&argv)?;
        let stdout = child
            .take_stdout()
            .expect("stdout is piped and untouched after spawn");

        let (stop_tx, stop_rx) = watch::channel(false);
        let interface = self.interface.clone();
        let log = Arc::clone(&self.log);
        let worker = tokio::spawn(async move {
            log::debug!(target: "flow sniffer", "capturing on interface={interface}");
            pump_lines(stdout, &log, stop_rx).await;
            // Killing the child is what unblocks a read stuck on a quiet
            // interface; an already-dead child makes this a no-op.
            child.kill().await;
            log::debug!(target: "flow sniffer", "stopped: interface={interface}");
        });

        Ok(SnifferHandle { stop_tx, worker })
    }
}

/// Running capture worker; stop by calling [`SnifferHandle::stop`].
#[derive(Debug)]
pub struct SnifferHandle {
    stop_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl SnifferHandle {
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Signals the worker to stop and waits for it to terminate.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.worker.await {
            log::warn!(target: "flow sniffer", "capture worker panicked: {err}");
        }
    }
}

/// Reads capture lines until EOF or the stop signal, appending a record for
/// every line with at least two IPv4 literals. Lines with fewer are dropped
/// silently; they are not errors.
async fn pump_lines<S>(stdout: S, log: &FlowLog, mut stop_rx: watch::Receiver<bool>)
where
    S: AsyncBufRead + Unpin,
{
    let mut lines = stdout.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some((source_ip, dest_ip)) = extract_endpoints(&line) {
                        log.push(FlowRecord::new(Utc::now(), source_ip, dest_ip));
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!(target: "flow sniffer", "capture stream read failed: {err}");
                    break;
                }
            },
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Extracts the first two IPv4 literals on a line as (source, destination).
///
/// Any further literals on the line are discarded.
fn extract_endpoints(line: &str) -> Option<(String, String)> {
    let mut matches = IPV4_PATTERN.find_iter(line);
    let source = matches.next()?.as_str().to_owned();
    let dest = matches.next()?.as_str().to_owned();
    Some((source, dest))
}

fn capture_argv(interface: &str) -> Vec<String> {
    vec![
        "tcpdump".to_owned(),
        "-i".to_owned(),
        interface.to_owned(),
        "-n".to_owned(),
        "-l".to_owned(),
    ]
}
