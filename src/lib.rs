//! dockwatch: a container observer built on the runtime's own CLI.
//!
//! Three kinds of collectors run concurrently: a per-container metric poller
//! with incremental log tailing, and one passive flow sniffer on the
//! container bridge interface. Each produces an append-only, time-ordered
//! record sequence that consumers (tables, graphs, aggregation) read at any
//! time without blocking collection.

use std::sync::Arc;
use std::time::Duration;

use error::ResultOkLogExt;
use supervisor::{CollectionSupervisor, Config};

pub mod command;
pub mod container;
pub mod error;
pub mod flow;
pub mod logs;
pub mod metrics;
pub mod supervisor;

use command::SystemRunner;

/// How often the running summary is logged.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// Per-container roll-up for the shutdown summary.
#[derive(Debug, serde::Serialize)]
struct ContainerSummary {
    id: container::ContainerID,
    name: String,
    samples: usize,
    status: String,
}

/// Final run summary emitted as JSON on shutdown.
#[derive(Debug, serde::Serialize)]
struct RunSummary {
    containers: Vec<ContainerSummary>,
    flow_records: usize,
    pair_counts: Vec<flow::PairCount>,
}

/// Builds the supervisor configuration from the environment.
///
/// `DOCKWATCH_INTERFACE` overrides the capture interface;
/// `DOCKWATCH_POLL_INTERVAL_SECS` overrides the poll interval. Unparseable
/// values fall back to the defaults with a warning.
fn config_from_env() -> Config {
    let mut config = Config::default();

    if let Ok(interface) = std::env::var("DOCKWATCH_INTERFACE") {
        config.capture_interface = interface;
    }
    if let Ok(raw) = std::env::var("DOCKWATCH_POLL_INTERVAL_SECS") {
        match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => config.poll_interval = Duration::from_secs(secs),
            _ => log::warn!("ignoring invalid DOCKWATCH_POLL_INTERVAL_SECS=`{raw}`"),
        }
    }

    config
}

/// Runs the observer until interrupted.
///
/// Lists the current containers, opens a polling worker for each, starts the
/// flow capture, and keeps collecting until ctrl-c. On shutdown every
/// collector is stopped and awaited, then a JSON run summary is logged.
///
/// # Errors
///
/// Returns an error if the interrupt signal handler cannot be installed.
/// Collection failures (unreachable runtime, capture startup) degrade the
/// affected view only and are logged, not returned.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config_from_env();
    log::debug!(
        "config: interface={}, poll_interval={:?}",
        config.capture_interface,
        config.poll_interval
    );

    let runner = Arc::new(SystemRunner::default());
    let (supervisor, mut refresh_rx) = CollectionSupervisor::new(Arc::clone(&runner), config);

    let containers = container::list_containers(runner.as_ref())
        .await
        .ok_log()
        .unwrap_or_default();
    log::info!("observing {} container(s)", containers.len());
    for container in containers {
        supervisor.open(container);
    }

    // Capture is all-or-nothing: a startup failure is reported once and the
    // flow view stays empty for this run.
    supervisor.start_capture().ok_log();

    tokio::spawn(async move {
        while let Some(event) = refresh_rx.recv().await {
            log::trace!("refresh derived views: container_id={}", event.container_id);
        }
    });

    let mut summary_ticker = tokio::time::interval(SUMMARY_INTERVAL);
    summary_ticker.tick().await; // immediate first tick
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = summary_ticker.tick() => {
                log::info!(
                    "collected: containers={}, flow_records={}",
                    supervisor.containers().len(),
                    supervisor.flows().len()
                );
            }
        }
    }

    log::info!("shutting down collectors");
    supervisor.close_all().await;

    let summary = RunSummary {
        containers: supervisor
            .containers()
            .into_iter()
            .map(|c| {
                let state = supervisor.state(c.id.as_ref());
                ContainerSummary {
                    samples: state.as_ref().map(|s| s.series.len()).unwrap_or(0),
                    status: state.map(|s| s.status.get()).unwrap_or_default(),
                    id: c.id,
                    name: c.name,
                }
            })
            .collect(),
        flow_records: supervisor.flows().len(),
        pair_counts: supervisor.aggregator().pair_counts(),
    };
    match serde_json::to_string(&summary) {
        Ok(json) => log::info!("run summary: {json}"),
        Err(err) => log::warn!("failed to serialize run summary: {err}"),
    }

    Ok(())
}
