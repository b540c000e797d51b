use thiserror::Error;

/// Failure to begin packet capture.
///
/// Fatal to the sniffer instance only: the collector transitions straight to
/// stopped, without retry, and no other collector is affected.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture could not start: {0}")]
    Startup(#[from] crate::command::ExecutionError),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
