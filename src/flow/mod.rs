//! Passive network-flow observation on a bridge interface.
//!
//! A single capture worker tails a packet-capture subprocess and reduces each
//! output line to a `(timestamp, source, destination)` tuple. Records land in
//! an append-only log that aggregation queries read concurrently with
//! capture. No packet semantics beyond IPv4-literal extraction are consumed.

use std::sync::RwLock;

use chrono::{DateTime, SubsecRound, Utc};

mod aggregate;
mod error;
mod sniffer;

pub use aggregate::{BucketCount, FlowAggregator, PairCount, pair_counts, time_buckets};
pub use error::{CaptureError, Result};
pub use sniffer::{FlowSniffer, SnifferHandle};

/// One observed connection: capture instant (second resolution), source and
/// destination IPv4 literals.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FlowRecord {
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub dest_ip: String,
}

impl FlowRecord {
    pub fn new(timestamp: DateTime<Utc>, source_ip: String, dest_ip: String) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            source_ip,
            dest_ip,
        }
    }

    /// The `"src->dst"` label used to group aggregate views.
    pub fn connection_label(&self) -> String {
        format!("{}->{}", self.source_ip, self.dest_ip)
    }
}

/// Append-only sequence of flow records in capture order.
///
/// Mutated only by the capture worker; read concurrently through
/// [`FlowLog::snapshot`]. Entries are never removed or reordered.
#[derive(Debug, Default)]
pub struct FlowLog {
    records: RwLock<Vec<FlowRecord>>,
}

impl FlowLog {
    pub fn push(&self, record: FlowRecord) {
        self.records
            .write()
            .expect("flow log lock poisoned")
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("flow log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the current contents. Safe to call while capture appends.
    pub fn snapshot(&self) -> Vec<FlowRecord> {
        self.records
            .read()
            .expect("flow log lock poisoned")
            .clone()
    }
}
