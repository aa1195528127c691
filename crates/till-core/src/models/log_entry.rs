//! Activity log entry model

use std::fmt;
use std::str::FromStr;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EventKind, LogMetadata};

/// Local, monotonically increasing identifier assigned on append
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(i64);

impl LogId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LogId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// An entry of the local activity log.
///
/// Entries are immutable once appended; only `synced` flips to true, and
/// `server_id` is stamped when the server acknowledged a single send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub local_id: LogId,
    pub server_id: Option<String>,
    /// Client-generated identifier the server uses to drop duplicate deliveries
    pub client_id: Uuid,
    pub kind: EventKind,
    /// Store identifier
    pub scope: String,
    /// User identifier
    pub actor: String,
    /// Creation timestamp (Unix ms)
    pub timestamp: i64,
    pub message: String,
    pub metadata: Option<LogMetadata>,
    pub synced: bool,
}

impl LogEntry {
    /// Timestamp rendered in the host's local timezone
    pub fn display_time(&self) -> String {
        Local
            .timestamp_millis_opt(self.timestamp)
            .single()
            .map_or_else(
                || self.timestamp.to_string(),
                |time| time.format("%Y-%m-%d %H:%M:%S").to_string(),
            )
    }
}

/// Entry content before the queue assigns identity and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub kind: EventKind,
    pub scope: String,
    pub actor: String,
    pub message: String,
    pub metadata: Option<LogMetadata>,
}

impl NewLogEntry {
    pub fn new(
        kind: EventKind,
        scope: impl Into<String>,
        actor: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            scope: scope.into(),
            actor: actor.into(),
            message: message.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: LogMetadata) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }
}
