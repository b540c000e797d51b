use std::time::Duration;

use thiserror::Error;

/// Errors from invoking an external command-line tool.
///
/// A command that produced empty stdout is *not* an error: an empty container
/// list or an empty log window are normal outcomes, and callers distinguish
/// "zero output" from "command failed" through this type alone.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{program}` did not complete within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("failed waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` produced no capturable output stream")]
    MissingStdout { program: String },
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
