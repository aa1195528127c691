//! Data models for Till

mod entity;
mod event;
mod log_entry;
mod metadata;

pub use entity::{EntityKind, EntitySnapshot};
pub use event::{EntityAction, EventKind, ParseEventKindError};
pub use log_entry::{LogEntry, LogId, NewLogEntry};
pub use metadata::{EntityMutation, LogMetadata, MetadataError};
