//! Per-container resource metrics: typed samples, the shared stat selection,
//! snapshot parsing, and the polling worker.
//!
//! Samples are append-only and time-ordered within one container. Readers
//! take cheap copy-on-read snapshots while the owning worker keeps appending;
//! entries are never mutated, removed, or reordered.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

mod error;
mod parser;
mod poller;

pub use error::StatParseError;
pub use parser::{StatReading, build_format, parse_stats};
pub use poller::{DEFAULT_POLL_INTERVAL, MetricPoller, PollerState, RefreshEvent, StatusCell};

/// One polled resource measurement for a container.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            timestamp,
            cpu_percent,
            memory_percent,
        }
    }
}

/// Append-only, time-ordered sequence of samples for one container.
///
/// Mutated only by the container's polling worker; read concurrently by any
/// number of consumers via [`SampleSeries::snapshot`].
#[derive(Debug, Default)]
pub struct SampleSeries {
    samples: RwLock<Vec<MetricSample>>,
}

impl SampleSeries {
    pub fn push(&self, sample: MetricSample) {
        self.samples
            .write()
            .expect("sample series lock poisoned")
            .push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples
            .read()
            .expect("sample series lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the current contents. Safe to call while the worker appends.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        self.samples
            .read()
            .expect("sample series lock poisoned")
            .clone()
    }

    pub fn last(&self) -> Option<MetricSample> {
        self.samples
            .read()
            .expect("sample series lock poisoned")
            .last()
            .cloned()
    }
}

/// Which stat fields every poller requests from the runtime.
///
/// Process-wide configuration; changes apply from each poller's *next* cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatSelection {
    pub cpu: bool,
    pub memory: bool,
    pub net_io: bool,
    pub disk_io: bool,
}

impl Default for StatSelection {
    fn default() -> Self {
        Self {
            cpu: true,
            memory: true,
            net_io: false,
            disk_io: false,
        }
    }
}

/// Shared, atomically-swapped [`StatSelection`] snapshot.
///
/// Writers replace the whole immutable snapshot; readers load it once at the
/// start of each poll cycle, so a cycle can never observe a half-updated
/// selection.
#[derive(Debug)]
pub struct SharedSelection {
    current: RwLock<Arc<StatSelection>>,
}

impl Default for SharedSelection {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(StatSelection::default())),
        }
    }
}

impl SharedSelection {
    pub fn new(selection: StatSelection) -> Self {
        Self {
            current: RwLock::new(Arc::new(selection)),
        }
    }

    /// Loads the current snapshot.
    pub fn load(&self) -> Arc<StatSelection> {
        Arc::clone(&self.current.read().expect("selection lock poisoned"))
    }

    /// Replaces the snapshot wholesale.
    pub fn store(&self, selection: StatSelection) {
        *self.current.write().expect("selection lock poisoned") = Arc::new(selection);
    }
}
