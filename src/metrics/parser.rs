//! Parsing of single-shot runtime stats snapshots.
//!
//! The runtime is asked for a snapshot formatted as `"Label: value"` pairs
//! joined by `" | "`, with the set of labels chosen from the current
//! [`StatSelection`](super::StatSelection). Percent-valued fields carry a
//! trailing `%` that is stripped before numeric parsing.

use std::collections::HashMap;

use super::StatSelection;
use super::error::StatParseError;

/// Separator between rendered stat fields.
pub const FIELD_SEPARATOR: &str = " | ";

/// Separator between a field label and its value.
const LABEL_SEPARATOR: &str = ": ";

/// Builds the runtime format request string for the given selection.
///
/// Only enabled fields are requested; the result is the exact `--format`
/// argument for the single-shot stats command.
pub fn build_format(selection: StatSelection) -> String {
    let mut parts = Vec::with_capacity(4);
    if selection.cpu {
        parts.push("CPU: {{.CPUPerc}}");
    }
    if selection.memory {
        parts.push("Memory: {{.MemPerc}}");
    }
    if selection.net_io {
        parts.push("Network I/O: {{.NetIO}}");
    }
    if selection.disk_io {
        parts.push("Disk I/O: {{.BlockIO}}");
    }
    parts.join(FIELD_SEPARATOR)
}

/// A stats snapshot parsed into labeled fields plus coerced percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct StatReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// All labeled fields verbatim, including non-percent ones.
    pub fields: HashMap<String, String>,
}

/// Parses one raw stats snapshot line.
///
/// # Errors
///
/// Returns [`StatParseError`] if the snapshot is empty or a segment lacks the
/// label separator. A present-but-unparseable percent value is coerced to
/// `0.0`, never an error.
pub fn parse_stats(raw: &str) -> Result<StatReading, StatParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StatParseError::Empty);
    }

    let mut fields = HashMap::new();
    for segment in raw.split(FIELD_SEPARATOR) {
        let Some((label, value)) = segment.split_once(LABEL_SEPARATOR) else {
            return Err(StatParseError::MissingSeparator {
                segment: segment.to_owned(),
            });
        };
        fields.insert(label.trim().to_owned(), value.trim().to_owned());
    }

    Ok(StatReading {
        cpu_percent: percent_field(&fields, "CPU"),
        memory_percent: percent_field(&fields, "Memory"),
        fields,
    })
}

/// Coerces a percent-suffixed field to `f64`, defaulting to `0.0` when the
/// field is absent or malformed.
fn percent_field(fields: &HashMap<String, String>, label: &str) -> f64 {
    fields
        .get(label)
        .map(|value| value.trim_end_matches('%'))
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(0.0)
}
