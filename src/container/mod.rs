//! Container identity and runtime list snapshots.
//!
//! Containers are discovered through the runtime CLI's list contract: one
//! pipe-delimited line per container with a fixed field template. The
//! resulting [`ContainerRef`] snapshot is immutable and replaced wholesale on
//! every refresh; there are no partial updates.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::command::Runner;

mod error;
mod utils;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Fixed field template for the runtime's list command.
const LIST_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.Image}}|{{.Status}}|{{.Command}}";

/// Number of pipe-delimited fields in one list line.
const LIST_FIELDS: usize = 5;

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use dockwatch::container::ContainerID;
/// let id = ContainerID::new("4f9c2a7d01ab").unwrap();
/// assert_eq!(id.as_ref(), "4f9c2a7d01ab");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty, longer
    /// than [`CONTAINER_ID_MAX_LEN`], or not lowercase alphanumeric.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_ID_MAX_LEN
            || !utils::is_lowercase_alpha_numeric(src.as_bytes())
        {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn to_arc(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One container as reported by the runtime's list command.
///
/// Identity is the id; the remaining fields are display metadata taken
/// verbatim from the runtime.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerRef {
    pub id: ContainerID,
    pub name: String,
    pub image: String,
    pub status: String,
    pub command: String,
}

impl serde::Serialize for ContainerID {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl ContainerRef {
    /// Parses one pipe-delimited list line into a `ContainerRef`.
    ///
    /// The command field is the last one and may itself contain pipes, so the
    /// split is bounded at [`LIST_FIELDS`] parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedListLine`] if the line has fewer than
    /// [`LIST_FIELDS`] fields, or [`Error::InvalidContainerID`] if the id
    /// field fails validation.
    pub fn from_list_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(LIST_FIELDS, '|');
        let (Some(id), Some(name), Some(image), Some(status), Some(command)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(Error::MalformedListLine(line.to_owned()));
        };

        Ok(Self {
            id: ContainerID::new(id)?,
            name: name.to_owned(),
            image: image.to_owned(),
            status: status.to_owned(),
            command: command.to_owned(),
        })
    }
}

/// Fetches the current container list snapshot from the runtime CLI.
///
/// Empty output means zero containers, not an error. Malformed lines are
/// logged and skipped so one bad entry cannot take down the whole listing.
///
/// # Errors
///
/// Returns an [`crate::command::ExecutionError`] if the list command itself
/// fails.
pub async fn list_containers<R: Runner>(runner: &R) -> crate::command::Result<Vec<ContainerRef>> {
    let argv = vec![
        "docker".to_owned(),
        "ps".to_owned(),
        "--format".to_owned(),
        LIST_FORMAT.to_owned(),
    ];
    let stdout = runner.run(&argv).await?;

    let mut containers = Vec::new();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match ContainerRef::from_list_line(line) {
            Ok(container) => containers.push(container),
            Err(err) => log::warn!(target: "container list", "skipping entry: {err}"),
        }
    }

    Ok(containers)
}
