use thiserror::Error;

/// Error raised when a stats snapshot line does not match the
/// `"Label: value"` pairs-joined-by-`" | "` contract.
///
/// Field-level numeric coercion failures are deliberately *not* errors:
/// a CPU or memory value that does not parse falls back to `0.0` so a single
/// garbled field never aborts a poll cycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatParseError {
    #[error("stats segment `{segment}` is missing the `: ` separator")]
    MissingSeparator { segment: String },

    #[error("stats snapshot was empty")]
    Empty,
}
