//! Incremental log tailing against the runtime's log command.
//!
//! The first fetch pulls the entire history; every later fetch passes the
//! previous fetch's invocation instant as an exclusive `--since` lower bound
//! so only new lines come back.

use std::sync::Arc;
use std::sync::RwLock;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::command::{ExecutionError, Runner};
use crate::container::ContainerID;

/// Exclusive lower time bound for the next log fetch.
///
/// On a successful fetch the watermark advances to the fetch's own wall-clock
/// instant, not to the timestamp of the last returned line. A line the
/// runtime emits late, between the old and new watermark, is therefore
/// permanently skipped. Known limitation of the since-based contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWatermark {
    pub last_fetch: DateTime<Utc>,
    pub first_fetch: bool,
}

impl LogWatermark {
    pub fn new() -> Self {
        Self {
            last_fetch: Utc::now(),
            first_fetch: true,
        }
    }
}

impl Default for LogWatermark {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches only-new log lines for one container.
#[derive(Debug)]
pub struct LogTailer<R> {
    container_id: ContainerID,
    runner: Arc<R>,
}

impl<R: Runner> LogTailer<R> {
    pub fn new(container_id: ContainerID, runner: Arc<R>) -> Self {
        Self {
            container_id,
            runner,
        }
    }

    /// Fetches log lines newer than the watermark.
    ///
    /// Returns the advanced watermark and the (possibly empty) concatenated
    /// new text. Errors propagate to the caller, which decides retry-or-skip
    /// for that cycle.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionError`] if the log command fails.
    pub async fn fetch(
        &self,
        watermark: LogWatermark,
    ) -> Result<(LogWatermark, String), ExecutionError> {
        let argv = log_argv(&self.container_id, watermark);
        let stdout = self.runner.run(&argv).await?;

        let advanced = LogWatermark {
            last_fetch: Utc::now(),
            first_fetch: false,
        };
        Ok((advanced, stdout.trim().to_owned()))
    }
}

/// Builds the log command argv for the given watermark state.
///
/// First fetch asks for full history; later fetches pass an RFC 3339 instant
/// with a trailing `Z` as the exclusive lower bound. `-t` requests per-line
/// timestamps in both cases.
fn log_argv(container_id: &ContainerID, watermark: LogWatermark) -> Vec<String> {
    if watermark.first_fetch {
        vec![
            "docker".to_owned(),
            "logs".to_owned(),
            "-t".to_owned(),
            container_id.to_string(),
        ]
    } else {
        vec![
            "docker".to_owned(),
            "logs".to_owned(),
            "--since".to_owned(),
            watermark
                .last_fetch
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            "-t".to_owned(),
            container_id.to_string(),
        ]
    }
}

/// Append-only accumulated log text for one container.
///
/// Written by the polling worker after each successful fetch; read
/// concurrently by consumers via [`LogBuffer::contents`].
#[derive(Debug, Default)]
pub struct LogBuffer {
    text: RwLock<String>,
}

impl LogBuffer {
    /// Appends a chunk of new log text. Empty chunks are ignored.
    pub fn append(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut text = self.text.write().expect("log buffer lock poisoned");
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(chunk);
    }

    pub fn contents(&self) -> String {
        self.text.read().expect("log buffer lock poisoned").clone()
    }
}
